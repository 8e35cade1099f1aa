//! Error types for talebound-hub

use std::time::Duration;
use talebound_core::{SessionId, ValidationError};
use talebound_journal::StoreError;
use thiserror::Error;

/// Result type for talebound-hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in talebound-hub
#[derive(Debug, Error)]
pub enum Error {
    /// The event was malformed and was not appended
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No session with this id
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// Transient store failure; the event was not recorded
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The session's write lock could not be taken in time
    #[error("session {session} is busy (waited {waited:?} for the write lock)")]
    Busy { session: SessionId, waited: Duration },

    /// Any other store failure
    #[error("store error: {0}")]
    Store(StoreError),

    /// Configuration could not be read or parsed
    #[error("config error: {0}")]
    Config(String),

    /// A state could not be encoded for fingerprinting
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl Error {
    /// Whether the same call may succeed if repeated
    ///
    /// A retried append is safe: neither a busy session nor an unavailable
    /// store has recorded anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::Busy { .. })
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(v) => Error::Validation(v),
            StoreError::UnknownSession(id) => Error::UnknownSession(id),
            StoreError::Unavailable(reason) => Error::StoreUnavailable(reason),
            other => Error::Store(other),
        }
    }
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
