use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings IO error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed settings file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unable to locate a config directory")]
    NoConfigDir,
}

/// Everything dbkeep remembers between process starts.
///
/// On disk: `{ "db_filepath": "/home/me/notes.db" }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_filepath: Option<PathBuf>,
}

/// The settings collaborator the manager persists the active path through.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Remember `path` as the database to reopen on the next start.
    async fn set_database_path(&self, path: &Path) -> Result<(), SettingsError>;

    /// The remembered database path, if any.
    async fn database_path(&self) -> Result<Option<PathBuf>, SettingsError>;
}

/// Settings kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    file: PathBuf,
}

impl JsonSettingsStore {
    /// `~/.config/dbkeep/settings.json` on Linux, `%APPDATA%\dbkeep\config\settings.json` on Windows, etc.
    pub fn new() -> Result<Self, SettingsError> {
        let proj = ProjectDirs::from("", "", "dbkeep").ok_or(SettingsError::NoConfigDir)?;
        Ok(Self::in_dir(proj.config_dir()))
    }

    /// Keep `settings.json` inside `dir` instead of the per-user config directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            file: dir.as_ref().join(SETTINGS_FILE),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Current settings; a missing file reads as defaults.
    pub async fn load(&self) -> Result<Settings, SettingsError> {
        match tokio::fs::read(&self.file).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings at {:?}, using defaults", self.file);
                Ok(Settings::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write all settings, replacing the file atomically.
    pub async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let bytes = serde_json::to_vec_pretty(settings)?;
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || write_replacing(&file, &bytes))
            .await
            .map_err(|e| SettingsError::Io(io::Error::other(e)))?
    }
}

/// Write through a uniquely named temporary file in the same directory, then
/// rename it over `file`, so concurrent writers never share a scratch file.
fn write_replacing(file: &Path, bytes: &[u8]) -> Result<(), SettingsError> {
    let dir = file
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(file).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn set_database_path(&self, path: &Path) -> Result<(), SettingsError> {
        let mut settings = self.load().await?;
        settings.db_filepath = Some(path.to_path_buf());
        self.save(&settings).await?;
        info!("Remembered database path {:?}", path);
        Ok(())
    }

    async fn database_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        Ok(self.load().await?.db_filepath)
    }
}
