use std::path::PathBuf;

use thiserror::Error;

use crate::connections::errors::ConnectionError;
use crate::storage::settings::SettingsError;

/// Everything the connection manager can report back to its caller.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Nothing has been opened yet (or the last connection was closed).
    #[error("no database is open")]
    NoConnection,

    #[error("database path must not be empty")]
    EmptyPath,

    #[error("failed to open database {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: ConnectionError,
    },

    #[error("failed to create database {path:?}")]
    Create {
        path: PathBuf,
        #[source]
        source: ConnectionError,
    },

    #[error("failed to delete existing database {path:?}")]
    Delete {
        path: PathBuf,
        #[source]
        source: ConnectionError,
    },

    /// The connection is active but will not be reopened on the next start.
    #[error("database {path:?} is open but its location could not be remembered")]
    SettingsPersist {
        path: PathBuf,
        #[source]
        source: SettingsError,
    },

    #[error("failed to read remembered database location")]
    SettingsLoad(#[source] SettingsError),

    #[error("no database location has been remembered yet")]
    NoRememberedPath,
}

impl ManagerError {
    /// True when the requested database did become the current one despite the error.
    pub fn connection_installed(&self) -> bool {
        matches!(self, ManagerError::SettingsPersist { .. })
    }
}
