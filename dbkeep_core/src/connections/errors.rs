use std::path::PathBuf;

use thiserror::Error;

/// A central error enum for the connection collaborator (open / create / delete).
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no database found at {0:?}")]
    NotFound(PathBuf),

    #[error("a database already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("Other error: {0}")]
    Other(String),
}

/// A blocking storage task that panicked or was cancelled.
impl From<tokio::task::JoinError> for ConnectionError {
    fn from(err: tokio::task::JoinError) -> Self {
        ConnectionError::Other(format!("storage task failed: {err}"))
    }
}
