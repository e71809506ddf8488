//! Bucket store error types

use thiserror::Error;

/// Errors that can occur in the bucket store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying SQLite database failed or is unreachable
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload (de)serialization failed
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be interpreted (bad timestamp, unknown resolution)
    #[error("corrupt bucket row: {0}")]
    Corruption(String),

    /// Lock acquisition failed
    #[error("lock error: {0}")]
    Lock(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
