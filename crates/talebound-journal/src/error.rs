//! Error types for talebound-journal

use talebound_core::{SessionId, ValidationError};
use thiserror::Error;

/// Log store error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// The event was malformed and was not appended
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No session with this id
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    /// A session with this id already exists
    #[error("Session already exists: {0}")]
    SessionExists(SessionId),

    /// Transient failure; nothing was recorded and the call may be retried
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A session document or export could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Result type for log store operations
pub type Result<T> = std::result::Result<T, StoreError>;
