//! Storage error types
//!
//! Defines all errors that can occur in the persistence layer.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur while reading or writing records
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite reported an error
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    /// I/O operation failed (creating the data directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint was violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored value could not be decoded
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == ErrorCode::ConstraintViolation
                    && msg.as_deref().is_some_and(|m| m.contains("UNIQUE")) =>
            {
                StorageError::Conflict(msg.clone().unwrap_or_default())
            }
            rusqlite::Error::FromSqlConversionFailure(_, _, cause) => {
                StorageError::Corruption(cause.to_string())
            }
            _ => StorageError::Sqlite(err),
        }
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
