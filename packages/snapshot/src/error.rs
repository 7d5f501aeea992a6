//! Snapshot error types.

use thiserror::Error;

use cairn_index::IndexError;
use cairn_store::StoreError;

/// Errors surfaced by the snapshot builder.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Another build holds the lock. Fatal for this build.
    #[error("snapshot build already in progress: {0}")]
    Locked(String),

    /// The event log is empty; there is nothing to snapshot.
    #[error("no event head in index pointer, nothing to snapshot")]
    EmptyLog,

    /// The chain walk produced no entries.
    #[error("no entries collected from event chain")]
    NoEntries,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    /// Checkpoint or lock file I/O failed.
    #[error("build state io: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document did not parse.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// Unrecoverable internal failure.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Malformed(err.to_string())
    }
}
