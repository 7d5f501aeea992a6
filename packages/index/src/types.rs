//! Core wire types: events, the index pointer, and queue items.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use cairn_store::Link;

/// Schema tag written on new events. Readers accept v0 and v1.
pub const EVENT_SCHEMA: &str = "cairn/event@v1";

/// Schema tag written on the index pointer. Readers accept v1 and v2.
pub const POINTER_SCHEMA: &str = "cairn/index-pointer@v2";

/// Current UTC time as RFC 3339 with a `Z` suffix.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn event_schema() -> String {
    EVENT_SCHEMA.to_string()
}

fn pointer_schema() -> String {
    POINTER_SCHEMA.to_string()
}

/// Kind of mutation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// First event for a PI.
    Create,
    /// Subsequent version of an existing PI.
    Update,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Create => write!(f, "create"),
            EventKind::Update => write!(f, "update"),
        }
    }
}

/// Immutable log record of a create or update, linked by `prev` into the
/// event chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default = "event_schema")]
    pub schema: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub pi: String,
    /// Manifest version at the time of the event.
    pub ver: u64,
    /// Manifest CID this event refers to.
    pub tip_cid: Link,
    pub ts: String,
    /// CID of the previous event, or null for genesis.
    #[serde(default)]
    pub prev: Option<Link>,
}

impl Event {
    /// CID of the previous event, if any.
    pub fn prev_cid(&self) -> Option<&str> {
        self.prev.as_ref().map(|l| l.cid.as_str())
    }
}

/// The single durable document naming the current log head, counts, and
/// the latest snapshot descriptor. Replaced wholesale on every write.
///
/// All fields default so v1 pointers (without the snapshot checkpoint
/// fields) still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPointer {
    #[serde(default = "pointer_schema")]
    pub schema: String,

    /// Head of the event chain (most recent event).
    #[serde(default)]
    pub event_head: Option<String>,
    /// Number of events reachable from `event_head`.
    #[serde(default)]
    pub event_count: u64,

    #[serde(default)]
    pub latest_snapshot_cid: Option<String>,
    /// `event_head` captured when the latest snapshot was built.
    #[serde(default)]
    pub snapshot_event_cid: Option<String>,
    #[serde(default)]
    pub snapshot_seq: u64,
    #[serde(default)]
    pub snapshot_count: u64,
    #[serde(default)]
    pub snapshot_ts: Option<String>,

    /// Number of distinct PIs with at least one create event.
    #[serde(default)]
    pub total_count: u64,

    #[serde(default)]
    pub last_snapshot_trigger: Option<String>,
    pub last_updated: String,
}

impl IndexPointer {
    /// The zero-valued pointer returned before the first append.
    pub fn empty() -> Self {
        Self {
            schema: POINTER_SCHEMA.to_string(),
            event_head: None,
            event_count: 0,
            latest_snapshot_cid: None,
            snapshot_event_cid: None,
            snapshot_seq: 0,
            snapshot_count: 0,
            snapshot_ts: None,
            total_count: 0,
            last_snapshot_trigger: None,
            last_updated: now_ts(),
        }
    }
}

/// An accepted ingest item waiting for the batch worker. The event
/// timestamp is stamped at enqueue time.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub kind: EventKind,
    pub pi: String,
    pub ver: u64,
    pub tip_cid: String,
    pub ts: String,
    pub queued_at: String,
}

impl QueuedEvent {
    pub fn new(kind: EventKind, pi: impl Into<String>, ver: u64, tip_cid: impl Into<String>) -> Self {
        let now = now_ts();
        Self {
            kind,
            pi: pi.into(),
            ver,
            tip_cid: tip_cid.into(),
            ts: now.clone(),
            queued_at: now,
        }
    }
}
