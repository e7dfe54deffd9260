pub mod connection_manager;
pub mod errors;
pub mod observers;

pub use connection_manager::*;
pub use errors::*;
