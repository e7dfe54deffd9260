use crate::connections::connection::ConnectionStore;
use crate::core::errors::ManagerError;
use crate::core::observers::{notify_all, ObserverRegistry, ObserverToken, OpenCallback};
use crate::storage::settings::SettingsStore;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

/// Options for [`ConnectionManager::create_new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Delete whatever already lives at the path before creating.
    pub overwrite: bool,
}

impl CreateOptions {
    pub fn overwriting() -> Self {
        Self { overwrite: true }
    }
}

/// The active connection and where it came from.
struct Active<C> {
    path: PathBuf,
    conn: Arc<C>,
}

struct Inner<S: ConnectionStore> {
    store: S,
    settings: Arc<dyn SettingsStore>,
    current: RwLock<Option<Active<S::Connection>>>,
    observers: Mutex<ObserverRegistry>,
    /// Serializes acquire → swap → persist → notify.
    transition: tokio::sync::Mutex<()>,
}

/// Owns at most one open database at a time.
///
/// Cloning the manager only bumps a reference count, so a single instance
/// can be handed to every part of the application that needs the database.
///
/// Reads (`current`, `current_path`, `is_open`) take a short-lived std
/// `RwLock` that is never held across an `.await` or an observer call.
/// Every state change holds the async `transition` lock for its whole
/// duration, so two concurrent opens can never interleave their swap,
/// persist and notify steps.
///
/// Replacing a connection drops the manager's reference to the previous one;
/// it is released once callers drop any `Arc` they still hold.
pub struct ConnectionManager<S: ConnectionStore> {
    inner: Arc<Inner<S>>,
}

impl<S: ConnectionStore> Clone for ConnectionManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ConnectionStore> ConnectionManager<S> {
    /// A manager in the Closed state.
    pub fn new(store: S, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                settings,
                current: RwLock::new(None),
                observers: Mutex::new(ObserverRegistry::default()),
                transition: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The active connection, or [`ManagerError::NoConnection`].
    pub fn current(&self) -> Result<Arc<S::Connection>, ManagerError> {
        self.read_current()
            .as_ref()
            .map(|active| Arc::clone(&active.conn))
            .ok_or(ManagerError::NoConnection)
    }

    /// Path the active connection was opened or created from.
    pub fn current_path(&self) -> Result<PathBuf, ManagerError> {
        self.read_current()
            .as_ref()
            .map(|active| active.path.clone())
            .ok_or(ManagerError::NoConnection)
    }

    pub fn is_open(&self) -> bool {
        self.read_current().is_some()
    }

    /// Open a database that already exists at `path` and make it current.
    ///
    /// On collaborator failure nothing changes. If only remembering the path
    /// fails, the new connection stays current, observers are still notified
    /// and [`ManagerError::SettingsPersist`] is returned.
    pub async fn open_existing(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Arc<S::Connection>, ManagerError> {
        let path = non_empty(path.as_ref())?;
        let _transition = self.inner.transition.lock().await;

        debug!("Opening existing database {:?}", path);
        let conn = self.inner.store.open(path).await.map_err(|source| {
            warn!("Could not open {:?}: {}", path, source);
            ManagerError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.install(path, conn).await
    }

    /// Create a database at `path` and make it current.
    ///
    /// With `overwrite`, existing data is deleted first; if that fails the
    /// create step is never attempted and the current connection is kept.
    /// Overwriting the path that is currently open drops the manager's handle
    /// to it before the delete, so until the create finishes the manager
    /// reads as Closed, and it stays Closed if the create fails. If the
    /// delete fails the same path is opened again and made current without
    /// persisting or notifying.
    pub async fn create_new(
        &self,
        path: impl AsRef<Path>,
        options: CreateOptions,
    ) -> Result<Arc<S::Connection>, ManagerError> {
        let path = non_empty(path.as_ref())?;
        let _transition = self.inner.transition.lock().await;

        if options.overwrite {
            // Our own handle must be gone before its files are removed.
            let was_open = self.release_if_at(path).is_some();
            if was_open {
                info!("Closed database {:?} to overwrite it", path);
            }
            debug!("Deleting existing data at {:?}", path);
            if let Err(source) = self.inner.store.delete(path).await {
                warn!("Could not delete {:?}: {}", path, source);
                if was_open {
                    self.reopen_after_failed_delete(path).await;
                }
                return Err(ManagerError::Delete {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        debug!("Creating database {:?}", path);
        let conn = self.inner.store.create(path).await.map_err(|source| {
            warn!("Could not create {:?}: {}", path, source);
            ManagerError::Create {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.install(path, conn).await
    }

    /// Open the database remembered by the settings collaborator.
    pub async fn reopen_last(&self) -> Result<Arc<S::Connection>, ManagerError> {
        let path = self
            .inner
            .settings
            .database_path()
            .await
            .map_err(ManagerError::SettingsLoad)?
            .ok_or(ManagerError::NoRememberedPath)?;
        info!("Reopening remembered database {:?}", path);
        self.open_existing(path).await
    }

    /// Try again to remember the current path, e.g. after a
    /// [`ManagerError::SettingsPersist`].
    pub async fn remember_current(&self) -> Result<(), ManagerError> {
        let _transition = self.inner.transition.lock().await;
        let path = self.current_path()?;
        self.persist(&path).await
    }

    /// Drop the active connection. Returns whether one was held.
    ///
    /// Settings are left alone and observers are not notified.
    pub async fn close(&self) -> bool {
        let _transition = self.inner.transition.lock().await;
        let previous = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match previous {
            Some(active) => {
                info!("Closed database {:?}", active.path);
                true
            }
            None => {
                debug!("close() called with no open database");
                false
            }
        }
    }

    /// Call `callback` after every successful open or create.
    ///
    /// Registering the same `Arc` again returns the token it already has.
    pub fn on_open(&self, callback: OpenCallback) -> ObserverToken {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(callback)
    }

    /// Stop notifying the observer behind `token`. Returns whether it was registered.
    pub fn remove_observer(&self, token: ObserverToken) -> bool {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unregister(token)
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn read_current(&self) -> RwLockReadGuard<'_, Option<Active<S::Connection>>> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the current connection out if it was opened from `path`.
    fn release_if_at(&self, path: &Path) -> Option<Active<S::Connection>> {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|active| active.path == path) {
            current.take()
        } else {
            None
        }
    }

    async fn reopen_after_failed_delete(&self, path: &Path) {
        match self.inner.store.open(path).await {
            Ok(conn) => {
                *self
                    .inner
                    .current
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Active {
                    path: path.to_path_buf(),
                    conn: Arc::new(conn),
                });
                info!("Reopened {:?} after the failed overwrite", path);
            }
            Err(e) => warn!(
                "Could not reopen {:?} after the failed overwrite, no database is open: {}",
                path, e
            ),
        }
    }

    /// Swap, persist, notify. Caller holds the transition lock.
    async fn install(
        &self,
        path: &Path,
        conn: S::Connection,
    ) -> Result<Arc<S::Connection>, ManagerError> {
        let conn = Arc::new(conn);
        let previous = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Active {
                path: path.to_path_buf(),
                conn: Arc::clone(&conn),
            });
        match previous {
            Some(old) => info!("Switched database from {:?} to {:?}", old.path, path),
            None => info!("Database {:?} is now open", path),
        }

        let persisted = self.persist(path).await;
        self.notify_observers();
        persisted.map(|()| conn)
    }

    async fn persist(&self, path: &Path) -> Result<(), ManagerError> {
        self.inner
            .settings
            .set_database_path(path)
            .await
            .map_err(|source| {
                warn!("Could not remember database path {:?}: {}", path, source);
                ManagerError::SettingsPersist {
                    path: path.to_path_buf(),
                    source,
                }
            })
    }

    fn notify_observers(&self) {
        let callbacks = self
            .inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot();
        debug!("Notifying {} open observer(s)", callbacks.len());
        let failed = notify_all(&callbacks);
        if failed > 0 {
            warn!("{} of {} open observer(s) failed", failed, callbacks.len());
        }
    }
}

fn non_empty(path: &Path) -> Result<&Path, ManagerError> {
    if path.as_os_str().is_empty() {
        Err(ManagerError::EmptyPath)
    } else {
        Ok(path)
    }
}
