//! Error types for store operations.

use thiserror::Error;

/// Categorised store failures.
///
/// `NotFound` and `Conflict` describe the caller's request; `Unavailable`
/// is transient infrastructure failure that the worker outer loop retries
/// with backoff rather than dropping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with existing immutable state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient infrastructure failure; safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A payload could not be serialised or deserialised.
    #[error("serialisation error: {0}")]
    Serialisation(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialisation(err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}
