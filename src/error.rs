// Error types for configuration loading and sync cycles
// Config errors are fatal at startup; sync errors abort one cycle only

use std::io;
use std::path::PathBuf;

/// Errors raised while loading and validating the configuration file.
///
/// These are only produced before the first cycle runs. The binary exits
/// with a non-zero status on any of them.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot parse config file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Required element {0} not found in config")]
    MissingKey(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("SSH key file {} not found", .0.display())]
    KeyFileMissing(PathBuf),

    #[error("Source directory {} does not exist", .0.display())]
    SourceMissing(PathBuf),
}

/// Errors that abort the current sync cycle.
///
/// The scheduler logs these and retries at the next poll tick.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The remote session could not be established.
    #[error("Connection to {target} failed: {reason}")]
    Connection { target: String, reason: String },

    /// A remote operation failed on an established session.
    #[error("Remote {operation} failed for {path}: {reason}")]
    Remote {
        operation: &'static str,
        path: String,
        reason: String,
    },

    /// The local manifest (or a local source file) could not be read or written.
    #[error("Local storage error while {operation} {}: {source}", path.display())]
    Storage {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Walking the source tree failed.
    #[error("Failed to scan {}: {reason}", path.display())]
    Scan { path: PathBuf, reason: String },
}

impl SyncError {
    pub fn remote(operation: &'static str, path: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Remote {
            operation,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn storage(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        SyncError::Storage {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Short label used in log lines and failure counters.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Connection { .. } => "connection",
            SyncError::Remote { .. } => "remote",
            SyncError::Storage { .. } => "storage",
            SyncError::Scan { .. } => "scan",
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
