use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("State lock error: {0}")]
    StateLock(String),
}

impl InfraError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Transport failures worth retrying; server answers are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
