pub mod sqlite_connection;

pub use sqlite_connection::{SqliteConnection, SqliteStore};
