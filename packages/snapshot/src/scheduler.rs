//! Periodic snapshot scheduling.
//!
//! Each tick: skip when a build already holds the lock or the index is
//! empty, stamp the trigger time on the pointer, then start the builder
//! off the critical path, fire and forget.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cairn_index::{now_ts, PointerStore};

use crate::builder::SnapshotBuilder;
use crate::error::SnapshotError;
use crate::lock::SnapshotLock;
use crate::types::BuildTrigger;

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// When false the scheduler task exits immediately.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            enabled: true,
        }
    }
}

/// Fires the snapshot builder on a fixed interval.
pub struct SnapshotScheduler {
    builder: Arc<SnapshotBuilder>,
    pointer: PointerStore,
    config: SchedulerConfig,
}

impl SnapshotScheduler {
    pub fn new(
        builder: Arc<SnapshotBuilder>,
        pointer: PointerStore,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            builder,
            pointer,
            config,
        }
    }

    /// Start the scheduler loop on the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        if !self.config.enabled {
            info!("auto snapshot disabled");
            return;
        }
        info!(
            interval_secs = self.config.interval.as_secs(),
            "snapshot scheduler running"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so builds start
        // one full interval after boot.
        interval.tick().await;

        loop {
            interval.tick().await;
            self.fire().await;
        }
    }

    async fn fire(&self) {
        if SnapshotLock::is_held(&self.builder.config().lock_path()) {
            info!("snapshot build already in progress, skipping scheduled trigger");
            return;
        }

        let mut pointer = match self.pointer.read().await {
            Ok(pointer) => pointer,
            Err(e) => {
                warn!(error = %e, "failed to read pointer, skipping scheduled trigger");
                return;
            }
        };
        if pointer.total_count == 0 {
            debug!("no entities to snapshot, skipping scheduled trigger");
            return;
        }

        info!(
            total = pointer.total_count,
            events = pointer.event_count,
            "scheduled snapshot trigger"
        );

        // May race with a large in-flight pointer write; last writer wins
        // on this one field.
        pointer.last_snapshot_trigger = Some(now_ts());
        if let Err(e) = self
            .pointer
            .write(&mut pointer, Some(self.builder.config().pointer_timeout))
            .await
        {
            warn!(error = %e, "failed to stamp snapshot trigger");
        }

        let builder = self.builder.clone();
        tokio::spawn(async move {
            match builder.build(BuildTrigger::Scheduled).await {
                Ok(report) => debug!(mode = ?report.mode, seq = report.seq, "scheduled build finished"),
                Err(SnapshotError::Locked(path)) => {
                    info!(path = %path, "scheduled build skipped, lock held")
                }
                Err(e) => error!(error = %e, "scheduled snapshot build failed"),
            }
        });
    }
}
