//! IO error types

use thiserror::Error;

/// Block-cache read errors
#[derive(Error, Debug)]
pub enum IoError {
    /// Standard IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry index outside the cached region
    #[error("Entry index {index} out of range (count {count})")]
    OutOfRange { index: usize, count: usize },

    /// The stream ended before the requested bytes
    #[error("Short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },
}

/// Result type for IO operations
pub type IoResult<T> = Result<T, IoError>;
