//! Error types for labtrack-sync.

use std::path::PathBuf;

use thiserror::Error;

use labtrack_core::error::StoreError;
use labtrack_core::types::OpportunityNumber;
use labtrack_remote::RemoteError;

/// All errors that can arise from synchronization operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the local record store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An error from the remote document store.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file parse error.
    #[error("failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// CSV serialization error (documentation export).
    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    /// An id column sync was requested before the remote folder exists.
    #[error("opportunity {number} has no remote folder yet")]
    FolderNotProvisioned { number: OpportunityNumber },

    /// All retry attempts for one operation were exhausted.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: RemoteError,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

impl SyncError {
    /// Whether retrying the whole operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            _ => false,
        }
    }
}
