//! Store error taxonomy.
//!
//! Three kinds matter to callers: `NotFound` (the path or CID does not
//! exist), `Transient` (timeouts and 5xx, safe to retry), and `Protocol`
//! (the store answered with an unexpected shape).

use thiserror::Error;

/// Errors surfaced by the store gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested file or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Timeout, connection failure or server-side 5xx. Retryable.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// The store responded with an unexpected status or body shape.
    #[error("store protocol error: {0}")]
    Protocol(String),
}

impl StoreError {
    /// True for errors the caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// True when the underlying path or CID does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            StoreError::Transient(err.to_string())
        } else {
            StoreError::Protocol(err.to_string())
        }
    }
}
