//! Error types for hashdb core.

use crate::fatal::StorageFault;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in hashdb core operations.
///
/// Everything except [`CoreError::Fatal`] is recoverable and returned to the
/// caller. `Fatal` only travels inside the crate: the public `Database`
/// operations hand it to the fatal-error handler, which does not return.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] hashdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write-path fault that leaves the file in an unknown state.
    #[error("fatal storage fault: {0}")]
    Fatal(#[from] StorageFault),

    /// Invalid database format or version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Configuration rejected at open time.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Insert of a key that is already present.
    #[error("key already exists")]
    KeyExists,

    /// A single key/value pair does not fit into an empty bucket.
    #[error("entry of {size} bytes exceeds bucket capacity of {capacity} bytes")]
    EntryTooLarge {
        /// Encoded size of the entry.
        size: usize,
        /// Largest entry an empty bucket can hold.
        capacity: usize,
    },

    /// The directory cannot double any further.
    #[error("directory full at {bits} bits")]
    DirectoryFull {
        /// Current directory depth.
        bits: u32,
    },

    /// Mutation attempted on a read-only handle.
    #[error("database opened read-only")]
    ReadOnly,

    /// Database is already open or locked.
    #[error("database locked: another handle has conflicting access")]
    DatabaseLocked,

    /// Database file does not exist and creation was not requested.
    #[error("database not found")]
    NotFound,

    /// Database already exists and `error_if_exists` was set.
    #[error("database already exists")]
    AlreadyExists,
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns `true` for faults that must end the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
