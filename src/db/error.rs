//! Database error types

use thiserror::Error;

use crate::store::StoreError;

/// Database facade errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Error from the store layer
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Blocking task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for DbError {
    fn from(e: tokio::task::JoinError) -> Self {
        DbError::Task(e.to_string())
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
