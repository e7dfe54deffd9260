//! In-memory `SettingsStore` that records every write and can be told to fail.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dbkeep_core::storage::{SettingsError, SettingsStore};

#[derive(Default)]
pub struct FakeSettings {
    writes: Mutex<Vec<PathBuf>>,
    remembered: Mutex<Option<PathBuf>>,
    failing: AtomicBool,
}

impl FakeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remembering(path: impl Into<PathBuf>) -> Self {
        let settings = Self::default();
        *settings.remembered.lock().unwrap() = Some(path.into());
        settings
    }

    /// Every path passed to `set_database_path`, including failed attempts.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap().clone()
    }

    pub fn remembered(&self) -> Option<PathBuf> {
        self.remembered.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingsStore for FakeSettings {
    async fn set_database_path(&self, path: &Path) -> Result<(), SettingsError> {
        self.writes.lock().unwrap().push(path.to_path_buf());
        if self.failing.load(Ordering::SeqCst) {
            return Err(SettingsError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        *self.remembered.lock().unwrap() = Some(path.to_path_buf());
        Ok(())
    }

    async fn database_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        Ok(self.remembered())
    }
}
