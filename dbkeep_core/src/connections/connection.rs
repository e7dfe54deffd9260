use std::path::Path;

use async_trait::async_trait;

use super::errors::ConnectionError;

/// The storage collaborator the manager delegates to.
///
/// Implementations own every detail of acquiring and destroying a backing
/// store; the manager only stores and hands back the `Connection` they return.
#[async_trait]
pub trait ConnectionStore: Send + Sync + 'static {
    /// Opaque handle to one open database.
    type Connection: Send + Sync + 'static;

    /// Open a database that is expected to already exist at `path`.
    async fn open(&self, path: &Path) -> Result<Self::Connection, ConnectionError>;

    /// Create a new database at `path`.
    async fn create(&self, path: &Path) -> Result<Self::Connection, ConnectionError>;

    /// Destroy whatever data lives at `path`.
    async fn delete(&self, path: &Path) -> Result<(), ConnectionError>;
}
