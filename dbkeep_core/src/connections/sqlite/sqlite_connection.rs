use crate::connections::{connection::ConnectionStore, errors::ConnectionError};
use async_trait::async_trait;
use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags};

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Files SQLite may leave next to the main database file.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// `user_version` stamped into every database created by [`SqliteStore`].
const SCHEMA_VERSION: i32 = 1;

/// One open SQLite database.
///
/// The raw `rusqlite::Connection` is not `Sync`, so it lives behind a mutex;
/// the handle itself can then be shared as `Arc<SqliteConnection>`.
/// The database is closed when the last reference is dropped.
pub struct SqliteConnection {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteConnection {
    fn new(path: PathBuf, conn: Connection) -> Self {
        Self {
            path,
            conn: Mutex::new(conn),
        }
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the underlying connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, ConnectionError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&*conn)?)
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        debug!("Closing SQLite database {:?}", self.path);
    }
}

/// [`ConnectionStore`] backed by SQLite database files.
///
/// All file and SQLite work is blocking, so each operation runs on
/// `tokio::task::spawn_blocking`.
#[derive(Debug, Clone, Default)]
pub struct SqliteStore;

impl SqliteStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    type Connection = SqliteConnection;

    async fn open(&self, path: &Path) -> Result<SqliteConnection, ConnectionError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || open_blocking(path)).await?
    }

    async fn create(&self, path: &Path) -> Result<SqliteConnection, ConnectionError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || create_blocking(path)).await?
    }

    async fn delete(&self, path: &Path) -> Result<(), ConnectionError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || delete_blocking(&path)).await?
    }
}

fn open_blocking(path: PathBuf) -> Result<SqliteConnection, ConnectionError> {
    if !path.is_file() {
        return Err(ConnectionError::NotFound(path));
    }
    info!("Opening SQLite database {:?}", path);
    // No CREATE flag: a file that vanished in the meantime must not be recreated empty.
    let conn = Connection::open_with_flags(
        &path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    // Headers are only read lazily; this fails for files that are not databases.
    let tables: i64 = conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))?;
    debug!("{:?} holds {} schema objects", path, tables);

    configure(&conn)?;
    Ok(SqliteConnection::new(path, conn))
}

fn create_blocking(path: PathBuf) -> Result<SqliteConnection, ConnectionError> {
    if path.exists() {
        return Err(ConnectionError::AlreadyExists(path));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    info!("Creating SQLite database {:?}", path);
    let conn = Connection::open_with_flags(
        &path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    configure(&conn)?;
    Ok(SqliteConnection::new(path, conn))
}

fn delete_blocking(path: &Path) -> Result<(), ConnectionError> {
    let removed = remove_if_present(path)?;
    for suffix in SIDECAR_SUFFIXES {
        remove_if_present(&sidecar(path, suffix))?;
    }
    if removed {
        info!("Deleted SQLite database {:?}", path);
    } else {
        debug!("Nothing to delete at {:?}", path);
    }
    Ok(())
}

/// `Ok(true)` if removed, `Ok(false)` if it didn't exist.
fn remove_if_present(path: &Path) -> Result<bool, ConnectionError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => {
            warn!("Failed to remove {:?}: {}", path, e);
            Err(e.into())
        }
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn configure(conn: &Connection) -> Result<(), ConnectionError> {
    let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    debug!("journal_mode={}", mode);
    conn.execute("PRAGMA synchronous=NORMAL", [])?;
    conn.execute("PRAGMA foreign_keys=ON", [])?;
    Ok(())
}
