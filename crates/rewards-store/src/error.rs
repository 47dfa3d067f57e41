//! Error types for the distribution store.

use thiserror::Error;

/// Errors surfaced by distribution store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error from the underlying database.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No record under the given key.
    #[error("Distribution not found: {0}")]
    NotFound(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
