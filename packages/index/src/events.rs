//! The event log: a singly-linked hash chain with a single writer.
//!
//! Appending is a read-pointer, put-events, write-pointer critical
//! section. A mutex serializes it within the process; a concurrent
//! appender reading a stale head would fork the chain. Cross-process
//! exclusion is out of scope (single active appender by deployment).
//!
//! If an event is stored but the pointer write fails, the event dangles:
//! pinned but unreachable from the head. That is recoverable, the next
//! successful append replaces the pointer. No partial recovery is
//! attempted here.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use cairn_store::{Cid, DagPutOpts, Link, Store};

use crate::error::IndexError;
use crate::pointer::PointerStore;
use crate::tips::{validate_pi, write_tip};
use crate::types::{now_ts, Event, EventKind, QueuedEvent, EVENT_SCHEMA};

/// Result of committing one batch to the chain.
#[derive(Debug)]
pub struct BatchOutcome {
    pub written: usize,
    pub failed: usize,
    /// Chain head after the batch, if anything was written.
    pub head: Option<Cid>,
}

/// One event as returned by the chain query.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub event_cid: Cid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub pi: String,
    pub ver: u64,
    pub tip_cid: Cid,
    pub ts: String,
}

/// A page of the chain walk plus the cursor to continue from.
#[derive(Debug)]
pub struct EventPage {
    pub items: Vec<EventRecord>,
    pub next_cursor: Option<Cid>,
}

/// Append-only event log over the store.
pub struct EventLog {
    store: Arc<dyn Store>,
    pointer: PointerStore,
    /// The log-writer right. Exactly one appender at a time.
    write_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(store: Arc<dyn Store>, pointer: PointerStore) -> Self {
        Self {
            store,
            pointer,
            write_lock: Mutex::new(()),
        }
    }

    /// Append a single event and return its CID. Errors are surfaced to
    /// the caller without touching the pointer.
    pub async fn append(
        &self,
        kind: EventKind,
        pi: &str,
        ver: u64,
        tip_cid: &str,
    ) -> Result<Cid, IndexError> {
        validate_pi(pi)?;

        let _guard = self.write_lock.lock().await;
        let mut pointer = self.pointer.read().await?;

        let event = Event {
            schema: EVENT_SCHEMA.to_string(),
            kind,
            pi: pi.to_string(),
            ver,
            tip_cid: Link::new(tip_cid),
            ts: now_ts(),
            prev: pointer.event_head.clone().map(Link::new),
        };
        let cid = self.put_event(&event).await?;

        if let Err(e) = write_tip(self.store.as_ref(), pi, tip_cid).await {
            warn!(pi, error = %e, "tip write failed after event append");
        }

        pointer.event_head = Some(cid.clone());
        pointer.event_count += 1;
        if kind == EventKind::Create {
            pointer.total_count += 1;
        }
        self.pointer.write(&mut pointer, None).await?;

        Ok(cid)
    }

    /// Commit a batch in arrival order: one pointer read, one `dag_put`
    /// per item against the running head, one pointer write at the end.
    ///
    /// A failed item is skipped without advancing the head, so it never
    /// corrupts the chain.
    pub async fn append_batch(&self, batch: Vec<QueuedEvent>) -> Result<BatchOutcome, IndexError> {
        let started = Instant::now();
        let _guard = self.write_lock.lock().await;
        let mut pointer = self.pointer.read().await?;
        let mut head = pointer.event_head.clone();

        let total = batch.len();
        let mut written = 0usize;
        let mut failed = 0usize;

        for item in batch {
            let event = Event {
                schema: EVENT_SCHEMA.to_string(),
                kind: item.kind,
                pi: item.pi.clone(),
                ver: item.ver,
                tip_cid: Link::new(item.tip_cid.clone()),
                ts: item.ts.clone(),
                prev: head.clone().map(Link::new),
            };
            match self.put_event(&event).await {
                Ok(cid) => {
                    head = Some(cid);
                    pointer.event_count += 1;
                    if item.kind == EventKind::Create {
                        pointer.total_count += 1;
                    }
                    if let Err(e) = write_tip(self.store.as_ref(), &item.pi, &item.tip_cid).await {
                        warn!(pi = %item.pi, error = %e, "tip write failed after event append");
                    }
                    written += 1;
                }
                Err(e) => {
                    warn!(pi = %item.pi, error = %e, "failed to store event, skipping");
                    failed += 1;
                }
            }
        }

        if written > 0 {
            pointer.event_head = head.clone();
            self.pointer.write(&mut pointer, None).await?;
        }

        info!(
            written,
            total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch committed"
        );
        Ok(BatchOutcome {
            written,
            failed,
            head,
        })
    }

    /// Walk the chain from `cursor` (default: the head) back via `prev`,
    /// returning up to `limit` events newest-first. The next cursor is the
    /// `prev` of the last returned item, or `None` at the chain end.
    pub async fn query(&self, limit: usize, cursor: Option<&str>) -> Result<EventPage, IndexError> {
        let mut current = match cursor {
            Some(cid) => Some(cid.to_string()),
            None => self.pointer.read().await?.event_head,
        };

        let mut items = Vec::new();
        while let Some(cid) = current {
            if items.len() >= limit {
                return Ok(EventPage {
                    items,
                    next_cursor: Some(cid),
                });
            }

            let value = self.store.dag_get(&cid).await?;
            let event: Event = serde_json::from_value(value)?;
            items.push(EventRecord {
                event_cid: cid,
                kind: event.kind,
                pi: event.pi,
                ver: event.ver,
                tip_cid: event.tip_cid.cid,
                ts: event.ts,
            });
            current = event.prev.map(|l| l.cid);
        }

        Ok(EventPage {
            items,
            next_cursor: None,
        })
    }

    async fn put_event(&self, event: &Event) -> Result<Cid, IndexError> {
        let doc = serde_json::to_value(event)?;
        Ok(self.store.dag_put(&doc, DagPutOpts::cbor()).await?)
    }
}
