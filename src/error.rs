use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cannot read source root {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Local I/O error at {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Lock marker already present at {location}, another sync is running or crashed")]
    LockContention { location: String },

    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("Checksums do not match (local {local}, remote {remote})")]
    ChecksumMismatch { local: String, remote: String },

    #[error("Upload aborted by abort-check")]
    Aborted,

    #[error("Invalid naming pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Name `{name}` is ambiguous for pattern `{pattern}` (encodes more than one date)")]
    AmbiguousName { name: String, pattern: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    pub fn transport(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Cooperative cancellation is an intentional stop, not a failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
