// Library module for datapush
// Re-exports modules for use in integration tests and the binary

pub mod config;
pub mod error;
pub mod remote;
pub mod sync;

pub use config::Config;
pub use error::{ConfigError, SyncError, SyncResult};
