pub mod connections;
pub mod core;
pub mod storage;
pub mod utils;

// re‑export ergonomic entry points
pub use crate::connections::sqlite::{SqliteConnection, SqliteStore};
pub use crate::core::connection_manager::{ConnectionManager, CreateOptions};
pub use crate::core::errors::ManagerError;
pub use crate::core::observers::{ObserverToken, OpenCallback};
pub use crate::storage::settings::{JsonSettingsStore, SettingsStore};
