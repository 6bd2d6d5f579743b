use crate::infrastructure::config::{ensure_default_configs, load_configs};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub window_state_path: PathBuf,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("focusdesk.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let _ = load_configs(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
        window_state_path: state_dir.join("window.json"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_is_idempotent() {
        let root = std::env::temp_dir().join(format!("focusdesk-bootstrap-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);

        let first = bootstrap_workspace(&root).expect("first bootstrap");
        fs::write(first.config_dir.join("app.json"), "{\"schema\":1,\"timezone\":\"UTC\"}\n")
            .expect("customize app config");
        let second = bootstrap_workspace(&root).expect("second bootstrap");

        assert_eq!(first.database_path, second.database_path);
        assert!(second.database_path.exists());
        assert!(second.logs_dir.is_dir());
        let app = fs::read_to_string(second.config_dir.join("app.json")).expect("read app config");
        assert!(app.contains("UTC"));
        let _ = fs::remove_dir_all(&root);
    }
}
