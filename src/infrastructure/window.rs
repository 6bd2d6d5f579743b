use crate::domain::models::TaskId;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusPresentation {
    pub active: bool,
    pub minimized: bool,
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowSignal {
    Focus(FocusPresentation),
    Background(bool),
}

pub trait WindowControl: Send + Sync {
    fn set_focus_presentation(&self, presentation: &FocusPresentation) -> Result<(), InfraError>;
    fn set_background_presentation(&self, active: bool) -> Result<(), InfraError>;
    fn persisted_focus(&self) -> Result<Option<FocusPresentation>, InfraError>;
}

#[derive(Debug)]
pub struct HeadlessWindow {
    state_path: Option<PathBuf>,
    signals: Mutex<Vec<WindowSignal>>,
}

impl HeadlessWindow {
    pub fn new(state_path: impl AsRef<Path>) -> Self {
        Self {
            state_path: Some(state_path.as_ref().to_path_buf()),
            signals: Mutex::new(Vec::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            state_path: None,
            signals: Mutex::new(Vec::new()),
        }
    }

    pub fn signals(&self) -> Vec<WindowSignal> {
        self.signals
            .lock()
            .map(|signals| signals.clone())
            .unwrap_or_default()
    }

    fn record(&self, signal: WindowSignal) -> Result<(), InfraError> {
        self.signals
            .lock()
            .map_err(|error| InfraError::StateLock(format!("window signal lock poisoned: {error}")))?
            .push(signal);
        Ok(())
    }
}

impl WindowControl for HeadlessWindow {
    fn set_focus_presentation(&self, presentation: &FocusPresentation) -> Result<(), InfraError> {
        self.record(WindowSignal::Focus(presentation.clone()))?;
        if let Some(path) = &self.state_path {
            let formatted = serde_json::to_string_pretty(presentation)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
        Ok(())
    }

    fn set_background_presentation(&self, active: bool) -> Result<(), InfraError> {
        self.record(WindowSignal::Background(active))
    }

    fn persisted_focus(&self) -> Result<Option<FocusPresentation>, InfraError> {
        let Some(path) = &self.state_path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_flags_survive_a_relaunch() {
        let path = std::env::temp_dir().join(format!(
            "focusdesk-window-test-{}.json",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);

        let window = HeadlessWindow::new(&path);
        assert_eq!(window.persisted_focus().expect("read missing"), None);
        let presentation = FocusPresentation {
            active: true,
            minimized: true,
            task_id: Some(TaskId::durable("server-3")),
        };
        window.set_focus_presentation(&presentation).expect("persist");
        window.set_background_presentation(true).expect("background");

        let relaunched = HeadlessWindow::new(&path);
        assert_eq!(relaunched.persisted_focus().expect("read"), Some(presentation.clone()));
        assert_eq!(
            window.signals(),
            vec![WindowSignal::Focus(presentation), WindowSignal::Background(true)]
        );
        let _ = fs::remove_file(&path);
    }
}
