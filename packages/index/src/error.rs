//! Index error types.

use thiserror::Error;

use cairn_store::StoreError;

/// Errors surfaced by the event log and ingest queue.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// PI failed validation (too short, non-ASCII, or contains a slash).
    #[error("invalid pi: {0}")]
    InvalidPi(String),

    /// The ingest queue is at capacity.
    #[error("ingest queue full")]
    QueueFull,

    /// The ingest worker has shut down.
    #[error("ingest queue closed")]
    QueueClosed,

    #[error("document serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IndexError {
    /// True for errors the client may retry after backing off.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexError::Store(e) => e.is_transient(),
            IndexError::QueueFull => true,
            _ => false,
        }
    }
}
