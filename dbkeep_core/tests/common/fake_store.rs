//! A deterministic **in‑process stand‑in** for a `ConnectionStore`.
//!
//! *  Paths count as "existing" once they were created or seeded with
//!    `FakeStore::seed`; `open` of anything else fails with `NotFound`.
//! *  Every call is recorded so tests can assert on ordering, e.g. that
//!    `delete` ran before `create`, or that `create` never ran at all.
//! *  Handles still alive when their path is deleted are recorded, the way a
//!    platform with mandatory file locks would refuse the delete.
//! *  Failures and per-path delays can be injected to drive error paths and
//!    interleavings without touching the filesystem.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dbkeep_core::connections::{ConnectionError, ConnectionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Open(PathBuf),
    Create(PathBuf),
    Delete(PathBuf),
}

/// What the manager hands out; `serial` tells two handles to the same path apart.
pub struct FakeConnection {
    pub path: PathBuf,
    pub serial: usize,
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for FakeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeConnection")
            .field("path", &self.path)
            .field("serial", &self.serial)
            .finish()
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if let Some(live) = state.live.get_mut(&self.path) {
            *live -= 1;
        }
    }
}

#[derive(Default)]
struct State {
    calls: Vec<StoreCall>,
    existing: HashSet<PathBuf>,
    failing_open: HashSet<PathBuf>,
    failing_create: HashSet<PathBuf>,
    failing_delete: HashSet<PathBuf>,
    delays: HashMap<PathBuf, Duration>,
    live: HashMap<PathBuf, usize>,
    deleted_while_open: Vec<PathBuf>,
    next_serial: usize,
}

#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a database already exists at `path`.
    pub fn seed(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().existing.insert(path.into());
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().unwrap().existing.contains(path.as_ref())
    }

    pub fn fail_open(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().failing_open.insert(path.into());
    }

    pub fn fail_create(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().failing_create.insert(path.into());
    }

    pub fn fail_delete(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().failing_delete.insert(path.into());
    }

    /// Make `open` of `path` take `delay` before it answers.
    pub fn delay(&self, path: impl Into<PathBuf>, delay: Duration) {
        self.state.lock().unwrap().delays.insert(path.into(), delay);
    }

    /// Handles to `path` that have not been dropped yet.
    pub fn live_handles(&self, path: impl AsRef<Path>) -> usize {
        let state = self.state.lock().unwrap();
        state.live.get(path.as_ref()).copied().unwrap_or(0)
    }

    /// Paths that were deleted while a handle to them was still alive.
    pub fn deleted_while_open(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().deleted_while_open.clone()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: StoreCall) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        let delay = match &call {
            StoreCall::Open(p) => state.delays.get(p).copied(),
            _ => None,
        };
        state.calls.push(call);
        delay
    }

    fn connection(&self, path: &Path) -> FakeConnection {
        let mut state = self.state.lock().unwrap();
        state.next_serial += 1;
        *state.live.entry(path.to_path_buf()).or_default() += 1;
        FakeConnection {
            path: path.to_path_buf(),
            serial: state.next_serial,
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl ConnectionStore for FakeStore {
    type Connection = FakeConnection;

    async fn open(&self, path: &Path) -> Result<FakeConnection, ConnectionError> {
        if let Some(delay) = self.record(StoreCall::Open(path.to_path_buf())) {
            tokio::time::sleep(delay).await;
        }
        {
            let state = self.state.lock().unwrap();
            if state.failing_open.contains(path) {
                return Err(ConnectionError::Other(format!("{path:?} is corrupt")));
            }
            if !state.existing.contains(path) {
                return Err(ConnectionError::NotFound(path.to_path_buf()));
            }
        }
        Ok(self.connection(path))
    }

    async fn create(&self, path: &Path) -> Result<FakeConnection, ConnectionError> {
        self.record(StoreCall::Create(path.to_path_buf()));
        {
            let mut state = self.state.lock().unwrap();
            if state.failing_create.contains(path) {
                return Err(ConnectionError::Other(format!("cannot create {path:?}")));
            }
            if !state.existing.insert(path.to_path_buf()) {
                return Err(ConnectionError::AlreadyExists(path.to_path_buf()));
            }
        }
        Ok(self.connection(path))
    }

    async fn delete(&self, path: &Path) -> Result<(), ConnectionError> {
        self.record(StoreCall::Delete(path.to_path_buf()));
        let mut state = self.state.lock().unwrap();
        if state.failing_delete.contains(path) {
            return Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only volume",
            )));
        }
        if state.live.get(path).copied().unwrap_or(0) > 0 {
            state.deleted_while_open.push(path.to_path_buf());
        }
        state.existing.remove(path);
        Ok(())
    }
}
