//! Storage error types

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Constraint violation: key {key:?} already exists in {table}")]
    ConstraintViolation { table: String, key: String },

    #[error("Key space exhausted: {table} has no surrogate keys left")]
    KeySpaceExhausted { table: String },

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Schema version mismatch: database is at version {found}, declared version is {expected}")]
    VersionMismatch { found: i32, expected: i32 },

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::StorageUnavailable(_))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StorageError::ConstraintViolation { .. })
    }
}

/// Failures where the host cannot give us a usable database file are
/// reported as `StorageUnavailable`; everything else stays an engine error.
impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::ReadOnly
                | ErrorCode::DiskFull
                | ErrorCode::PermissionDenied
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase,
            ) => StorageError::StorageUnavailable(e.to_string()),
            _ => StorageError::Sqlite(e),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::StorageUnavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::Task(e.to_string())
    }
}
