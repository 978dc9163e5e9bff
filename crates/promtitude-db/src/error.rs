//! Database error types.

use promtitude_core::ItemStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("queue item '{0}' not found")]
    ItemNotFound(String),

    /// Status change the queue does not allow, e.g. completed -> processing
    #[error("invalid status transition {from} -> {to} for item {id}")]
    InvalidTransition {
        id: String,
        from: ItemStatus,
        to: ItemStatus,
    },

    /// Clear request that would drop an item mid-import. The message is
    /// shown to the user as is.
    #[error("{0}")]
    ClearRefused(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// A stored row holds a value this version cannot parse
    #[error("decode error: {0}")]
    Decode(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DatabaseError> for promtitude_core::PromtitudeError {
    fn from(err: DatabaseError) -> Self {
        Self::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
