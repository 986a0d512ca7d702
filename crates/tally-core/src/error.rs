//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The ledger could not be reached (pool checkout timed out, file unopenable)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A row whose date or amount cannot be normalized
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A confirmation missing required fields or naming an unknown candidate
    #[error("Invalid confirmation: {0}")]
    InvalidConfirmation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl Error {
    /// Whether the operation may succeed if simply retried later
    ///
    /// Lock contention that outlived the busy timeout and pool checkout
    /// timeouts both count; malformed input never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StorageUnavailable(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
