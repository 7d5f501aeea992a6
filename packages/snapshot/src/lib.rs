//! Cairn snapshot engine.
//!
//! Materializes the live (PI, latest manifest) set implied by the event
//! chain into an immutable snapshot document, accompanied by a SHA-256
//! Merkle root over the closure of referenced CIDs and a cross-snapshot
//! non-deletion check. Builds are incremental when a previous snapshot
//! checkpoint exists: cost scales with the delta, not with history.

pub mod builder;
pub mod checkpoint;
pub mod error;
pub mod lock;
pub mod proof;
pub mod scheduler;
pub mod types;

pub use builder::{SnapshotBuilder, SnapshotConfig};
pub use error::SnapshotError;
pub use lock::SnapshotLock;
pub use proof::{collect_all_cids, generate_consistency_info, merkle_root};
pub use scheduler::{SchedulerConfig, SnapshotScheduler};
pub use types::{
    BuildMode, BuildReport, BuildTrigger, ConsistencyInfo, Manifest, Snapshot, SnapshotEntry,
};

use tracing::warn;

/// Remove partial build state left behind by a crashed process: the
/// checkpoint file always, the lock file when stale. Called at startup.
pub fn cleanup_workdir(config: &SnapshotConfig) {
    let checkpoint = config.checkpoint_path();
    if checkpoint.exists() {
        if let Err(e) = std::fs::remove_file(&checkpoint) {
            warn!(path = %checkpoint.display(), error = %e, "failed to remove stale checkpoint");
        }
    }
    lock::remove_if_stale(&config.lock_path());
}
