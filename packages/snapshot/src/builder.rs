//! The snapshot builder.
//!
//! Three phases: walk the event chain into a streamed checkpoint of
//! entries, collect the CID closure and its Merkle root, then assemble the
//! document and atomically replace the pointer. Incremental builds walk
//! only the events since the previous snapshot's checkpoint and reuse its
//! CID closure as a baseline.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{error, info, warn};

use cairn_index::{now_ts, tips, PointerStore};
use cairn_store::{link_cid, DagPutOpts, Link, Store};

use crate::checkpoint::{self, CheckpointWriter};
use crate::error::SnapshotError;
use crate::lock::SnapshotLock;
use crate::proof::{collect_all_cids, generate_consistency_info, merkle_root};
use crate::types::{
    BuildMode, BuildReport, BuildTrigger, Manifest, Snapshot, SnapshotEntry, SNAPSHOT_SCHEMA,
};

/// Builder tuning and working paths.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Directory for the lock and checkpoint files.
    pub work_dir: PathBuf,
    /// Directory for local snapshot metadata files.
    pub snapshots_dir: PathBuf,
    /// Timeout for storing the (possibly very large) snapshot document.
    pub put_timeout: Duration,
    /// Timeout for the final pointer replacement.
    pub pointer_timeout: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            snapshots_dir: PathBuf::from("./snapshots"),
            put_timeout: Duration::from_secs(300),
            pointer_timeout: Duration::from_secs(600),
        }
    }
}

impl SnapshotConfig {
    pub fn lock_path(&self) -> PathBuf {
        self.work_dir.join("cairn-snapshot.lock")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.work_dir.join("cairn-snapshot-entries.ndjson")
    }
}

/// Result of phase 1: the live entry set and what the walk learned.
struct PhaseOne {
    entries: Vec<SnapshotEntry>,
    events_walked: usize,
    /// PIs touched by the delta. `None` after a full walk.
    modified_pis: Option<HashSet<String>>,
    /// Previous snapshot's CID closure, if it carried one.
    prev_all_cids: Option<Vec<String>>,
}

/// Builds snapshots of the live entity set.
pub struct SnapshotBuilder {
    store: Arc<dyn Store>,
    pointer: PointerStore,
    config: SnapshotConfig,
}

impl SnapshotBuilder {
    pub fn new(store: Arc<dyn Store>, pointer: PointerStore, config: SnapshotConfig) -> Self {
        Self {
            store,
            pointer,
            config,
        }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Run one build to completion. Holds the file-system lock for the
    /// whole build; the lock is released on every exit path.
    pub async fn build(&self, trigger: BuildTrigger) -> Result<BuildReport, SnapshotError> {
        let started = Instant::now();
        let _lock = SnapshotLock::acquire(&self.config.lock_path())?;

        let pointer = self.pointer.read().await?;
        let event_head = pointer.event_head.clone().ok_or(SnapshotError::EmptyLog)?;
        let prev_snapshot_cid = pointer.latest_snapshot_cid.clone();
        let new_seq = pointer.snapshot_seq + 1;

        if let (Some(_), Some(checkpoint_cid)) = (&prev_snapshot_cid, &pointer.snapshot_event_cid)
        {
            if *checkpoint_cid == event_head {
                info!(
                    seq = pointer.snapshot_seq,
                    "event head unchanged since last snapshot, nothing to do"
                );
                return Ok(BuildReport::skipped(pointer.snapshot_seq, started.elapsed()));
            }
        }

        let ts = now_ts();
        info!(seq = new_seq, trigger = ?trigger, head = %event_head, "starting snapshot build");

        // Phase 1: entry collection.
        let (mode, phase1) = match (&prev_snapshot_cid, &pointer.snapshot_event_cid) {
            (Some(prev_cid), Some(checkpoint_cid)) => {
                match self
                    .collect_incremental(&event_head, prev_cid, checkpoint_cid)
                    .await
                {
                    Ok(phase1) => (BuildMode::Incremental, phase1),
                    Err(e) => {
                        warn!(error = %e, "incremental collection failed, falling back to full walk");
                        (BuildMode::Full, self.collect_full(&event_head).await?)
                    }
                }
            }
            _ => (BuildMode::Full, self.collect_full(&event_head).await?),
        };

        if phase1.entries.is_empty() {
            return Err(SnapshotError::NoEntries);
        }
        info!(
            mode = ?mode,
            entries = phase1.entries.len(),
            events_walked = phase1.events_walked,
            "entry collection complete"
        );

        // Phase 2: CID closure and proof.
        let all_cids = collect_all_cids(
            self.store.as_ref(),
            &phase1.entries,
            phase1.prev_all_cids.as_deref(),
            phase1.modified_pis.as_ref(),
        )
        .await?;

        let root = {
            let cids = all_cids.clone();
            tokio::task::spawn_blocking(move || merkle_root(&cids))
                .await
                .map_err(|e| SnapshotError::Fatal(format!("merkle task: {e}")))?
        };

        let consistency = phase1.prev_all_cids.as_deref().map(|prev| {
            let prev: BTreeSet<String> = prev.iter().cloned().collect();
            generate_consistency_info(&prev, &all_cids)
        });
        if let Some(info) = &consistency {
            if !info.is_append_only {
                // The snapshot itself records the evidence; the build
                // continues.
                error!(
                    deleted = info.deleted_count,
                    added = info.added_count,
                    "append-only consistency violated between snapshots"
                );
            }
        }

        // Phase 3: assemble, store, replace the pointer.
        let entry_count = phase1.entries.len();
        let cid_count = all_cids.len();
        let snapshot = Snapshot {
            schema: SNAPSHOT_SCHEMA.to_string(),
            seq: new_seq,
            ts: ts.clone(),
            event_cid: event_head.clone(),
            prev_snapshot: prev_snapshot_cid.map(Link::new),
            total_count: entry_count as u64,
            entries: phase1.entries,
            merkle_root: Some(root.clone()),
            cid_count: cid_count as u64,
            all_cids: all_cids.into_iter().collect(),
            consistency,
        };
        let doc = serde_json::to_value(&snapshot)?;
        let snapshot_cid = self
            .store
            .dag_put(
                &doc,
                DagPutOpts::json()
                    .with_big_block()
                    .with_timeout(self.config.put_timeout),
            )
            .await?;

        // Re-read so appends that landed during the build keep their head.
        let mut current = self.pointer.read().await?;
        current.latest_snapshot_cid = Some(snapshot_cid.clone());
        current.snapshot_event_cid = Some(event_head.clone());
        current.snapshot_seq = new_seq;
        current.snapshot_count = entry_count as u64;
        current.snapshot_ts = Some(ts.clone());
        current.total_count = entry_count as u64;
        self.pointer
            .write(&mut current, Some(self.config.pointer_timeout))
            .await?;

        if let Err(e) = self.save_metadata(&snapshot_cid, new_seq, &ts, entry_count) {
            warn!(error = %e, "failed to save local snapshot metadata");
        }
        checkpoint::remove(&self.config.checkpoint_path());

        info!(
            cid = %snapshot_cid,
            seq = new_seq,
            entries = entry_count,
            cids = cid_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot build complete"
        );
        Ok(BuildReport {
            mode,
            seq: new_seq,
            snapshot_cid: Some(snapshot_cid),
            entry_count,
            cid_count,
            events_walked: phase1.events_walked,
            merkle_root: Some(root),
            elapsed: started.elapsed(),
        })
    }

    /// Full walk: newest-first over the whole chain, first event per PI
    /// wins, entries streamed to the checkpoint file then reversed into
    /// chronological order.
    async fn collect_full(&self, event_head: &str) -> Result<PhaseOne, SnapshotError> {
        let mut writer = CheckpointWriter::create(&self.config.checkpoint_path())?;
        let mut seen_pis: HashSet<String> = HashSet::new();
        let mut seen_events: HashSet<String> = HashSet::new();
        let mut walked = 0usize;

        let mut current = Some(event_head.to_string());
        while let Some(cid) = current.take() {
            if !seen_events.insert(cid.clone()) {
                warn!(cid = %cid, "event chain revisited a cid, terminating walk");
                break;
            }
            let event = match self.store.dag_get(&cid).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(cid = %cid, error = %e, "failed to fetch event, terminating walk");
                    break;
                }
            };
            walked += 1;

            let next = event.get("prev").and_then(link_cid).map(str::to_string);
            let Some(pi) = event.get("pi").and_then(Value::as_str).map(str::to_string) else {
                warn!(cid = %cid, "event without pi, skipping");
                current = next;
                continue;
            };
            if !seen_pis.insert(pi.clone()) {
                current = next;
                continue;
            }

            let ts = event
                .get("ts")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if let Some(entry) = self.entry_for(&pi, &ts, &cid).await {
                writer.append(&entry)?;
                if writer.count() % 100 == 0 {
                    info!(entries = writer.count(), "collecting entries from event chain");
                }
            }
            current = next;
        }

        let path = writer.finish()?;
        let mut entries = checkpoint::read_entries(&path)?;
        entries.reverse();
        Ok(PhaseOne {
            entries,
            events_walked: walked,
            modified_pis: None,
            prev_all_cids: None,
        })
    }

    /// Incremental walk: hydrate the previous snapshot's entries, then
    /// recompute only the PIs touched between the head and the previous
    /// checkpoint (exclusive). The first delta event per PI wins.
    async fn collect_incremental(
        &self,
        event_head: &str,
        prev_snapshot_cid: &str,
        checkpoint_cid: &str,
    ) -> Result<PhaseOne, SnapshotError> {
        let value = self.store.dag_get(prev_snapshot_cid).await?;
        let prev: Snapshot = serde_json::from_value(value)?;
        let prev_has_proof = prev.has_proof();
        let prev_all = prev.all_cids;

        let mut by_pi: BTreeMap<String, SnapshotEntry> = prev
            .entries
            .into_iter()
            .map(|entry| (entry.pi.clone(), entry))
            .collect();
        let mut modified: HashSet<String> = HashSet::new();
        let mut seen_events: HashSet<String> = HashSet::new();
        let mut walked = 0usize;

        let mut current = Some(event_head.to_string());
        while let Some(cid) = current.take() {
            if cid == checkpoint_cid {
                break;
            }
            if !seen_events.insert(cid.clone()) {
                warn!(cid = %cid, "event chain revisited a cid, terminating delta walk");
                break;
            }
            let event = self.store.dag_get(&cid).await?;
            walked += 1;

            let next = event.get("prev").and_then(link_cid).map(str::to_string);
            if next.is_none() {
                warn!("delta walk reached genesis without meeting the previous checkpoint");
            }
            let Some(pi) = event.get("pi").and_then(Value::as_str).map(str::to_string) else {
                warn!(cid = %cid, "event without pi, skipping");
                current = next;
                continue;
            };
            if !modified.insert(pi.clone()) {
                current = next;
                continue;
            }

            let ts = event
                .get("ts")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match self.entry_for(&pi, &ts, &cid).await {
                Some(entry) => {
                    by_pi.insert(pi, entry);
                }
                None => {
                    // An unreadable tip is not a deletion. The entry from
                    // the previous snapshot, if any, stays as-is rather
                    // than vanishing and tripping the next consistency
                    // check.
                    if by_pi.contains_key(&pi) {
                        warn!(pi = %pi, "tip unreadable, keeping previous snapshot entry");
                    }
                }
            }
            current = next;
        }

        // Hydrating through the map loses walk order; sort back to
        // chronological.
        let mut entries: Vec<SnapshotEntry> = by_pi.into_values().collect();
        entries.sort_by(|a, b| a.ts.cmp(&b.ts));

        let mut writer = CheckpointWriter::create(&self.config.checkpoint_path())?;
        for entry in &entries {
            writer.append(entry)?;
        }
        writer.finish()?;

        Ok(PhaseOne {
            entries,
            events_walked: walked,
            modified_pis: Some(modified),
            prev_all_cids: prev_has_proof.then_some(prev_all),
        })
    }

    /// Recompute one entity's entry from its tip file and manifest.
    /// Returns `None` when the tip is unreadable; an unreadable manifest
    /// records a placeholder version.
    async fn entry_for(&self, pi: &str, ts: &str, chain_cid: &str) -> Option<SnapshotEntry> {
        let tip_cid = match tips::read_tip(self.store.as_ref(), pi).await {
            Ok(cid) => cid,
            Err(e) => {
                warn!(pi, error = %e, "failed to read tip, skipping entity");
                return None;
            }
        };

        let ver = match self.store.dag_get(&tip_cid).await {
            Ok(value) => serde_json::from_value::<Manifest>(value)
                .map(|m| m.ver)
                .unwrap_or(0),
            Err(e) => {
                warn!(pi, error = %e, "manifest fetch failed, recording version 0");
                0
            }
        };

        Some(SnapshotEntry {
            pi: pi.to_string(),
            ver,
            tip_cid: Link::new(tip_cid),
            ts: ts.to_string(),
            chain_cid: Link::new(chain_cid),
        })
    }

    fn save_metadata(
        &self,
        cid: &str,
        seq: u64,
        ts: &str,
        count: usize,
    ) -> Result<(), SnapshotError> {
        std::fs::create_dir_all(&self.config.snapshots_dir)?;
        let metadata = serde_json::json!({
            "cid": cid,
            "seq": seq,
            "ts": ts,
            "count": count,
        });
        let body = serde_json::to_vec_pretty(&metadata)?;
        std::fs::write(
            self.config.snapshots_dir.join(format!("snapshot-{seq}.json")),
            &body,
        )?;
        std::fs::write(self.config.snapshots_dir.join("latest.json"), &body)?;
        Ok(())
    }
}
