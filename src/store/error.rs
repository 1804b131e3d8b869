//! Store error types

use std::path::PathBuf;

use thiserror::Error;

/// Store operation errors
///
/// A key without a stored value is never an error: fetch reports it as
/// `None` and remove returns it in its not-found list.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error from the block cache
    #[error("IO error: {0}")]
    Io(#[from] crate::io::IoError),

    /// Standard IO error
    #[error("IO error: {0}")]
    StdIo(#[from] std::io::Error),

    /// On-disk invariants violated
    #[error("Corrupt store file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Key or value not representable in this store
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        let path = path.into();
        let reason = reason.into();
        tracing::warn!(path = %path.display(), %reason, "store corruption detected");
        StoreError::Corrupt { path, reason }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
