//! Snapshot document types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cairn_store::Link;

/// Schema tag written on new snapshots. Readers accept `snapshot@v1`
/// documents, which carry no proof fields.
pub const SNAPSHOT_SCHEMA: &str = "cairn/snapshot@v2";

fn snapshot_schema() -> String {
    SNAPSHOT_SCHEMA.to_string()
}

/// One live entity in a snapshot: its PI and latest manifest, plus the
/// chain event that last touched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub pi: String,
    pub ver: u64,
    pub tip_cid: Link,
    pub ts: String,
    pub chain_cid: Link,
}

/// Cross-snapshot non-deletion check over the CID closures of two
/// adjacent snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyInfo {
    pub prev_cid_count: u64,
    pub curr_cid_count: u64,
    pub added_count: u64,
    pub deleted_count: u64,
    pub is_append_only: bool,
}

/// Materialized, verifiable image of the current entity set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "snapshot_schema")]
    pub schema: String,
    pub seq: u64,
    pub ts: String,
    /// `event_head` captured at build start.
    pub event_cid: String,
    #[serde(default)]
    pub prev_snapshot: Option<Link>,
    pub total_count: u64,
    /// Oldest first.
    pub entries: Vec<SnapshotEntry>,

    /// SHA-256 Merkle root over the CID closure. Absent on v1 snapshots.
    #[serde(default)]
    pub merkle_root: Option<String>,
    #[serde(default)]
    pub cid_count: u64,
    /// Sorted CID closure, the incremental baseline for the next build.
    #[serde(default)]
    pub all_cids: Vec<String>,
    /// Null on the first proof-carrying snapshot.
    #[serde(default)]
    pub consistency: Option<ConsistencyInfo>,
}

impl Snapshot {
    /// True when this snapshot carries proof fields usable as an
    /// incremental baseline.
    pub fn has_proof(&self) -> bool {
        self.merkle_root.is_some()
    }
}

/// Entity manifest, produced upstream. Only `ver`, `prev` and
/// `components` matter here; everything else passes through untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub ver: u64,
    #[serde(default)]
    pub prev: Option<Link>,
    #[serde(default)]
    pub components: BTreeMap<String, Link>,
}

/// How a build traversed the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Walked the whole chain.
    Full,
    /// Walked only the delta since the previous snapshot.
    Incremental,
    /// Head unchanged since the last snapshot; nothing to do.
    Skipped,
}

/// What started a build. Only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTrigger {
    Scheduled,
    Manual,
}

/// Summary of one completed build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub mode: BuildMode,
    pub seq: u64,
    pub snapshot_cid: Option<String>,
    pub entry_count: usize,
    pub cid_count: usize,
    pub events_walked: usize,
    pub merkle_root: Option<String>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub(crate) fn skipped(seq: u64, elapsed: Duration) -> Self {
        Self {
            mode: BuildMode::Skipped,
            seq,
            snapshot_cid: None,
            entry_count: 0,
            cid_count: 0,
            events_walked: 0,
            merkle_root: None,
            elapsed,
        }
    }
}
