//! Error types for the SQLite store.

use satchel_session::StoreError;
use thiserror::Error;

/// Errors that can occur in the SQLite store.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A value blob could not be sealed or opened.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// No row exists for the session id.
    #[error("Session row not found: {0}")]
    NotFound(String),

    /// A stored row holds data this store cannot interpret.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Filesystem error while preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, SqliteStoreError>;

impl From<SqliteStoreError> for StoreError {
    fn from(e: SqliteStoreError) -> Self {
        match e {
            SqliteStoreError::Database(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Exists(msg.unwrap_or_else(|| err.to_string()))
            }
            SqliteStoreError::NotFound(id) => StoreError::NotFound(id),
            SqliteStoreError::Crypto(msg) | SqliteStoreError::InvalidData(msg) => {
                StoreError::Integrity(msg)
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}
