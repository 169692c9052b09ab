//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The owner CHECK constraint rejected a write.
    #[error("owner constraint violated: {0}")]
    OwnerConstraint(String),

    /// Any other constraint rejected a write.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// JSON column serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking task running the query failed.
    #[error("background task failed: {0}")]
    Task(String),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("connection lock poisoned")]
    Poisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
