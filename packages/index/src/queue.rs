//! The ingest queue.
//!
//! Decouples client latency from log-write latency: `enqueue` returns as
//! soon as the item is in the bounded channel, and a single background
//! worker drains it in batches through [`EventLog::append_batch`]. The
//! worker is the only path onto the chain in normal operation, which makes
//! the single-writer serialization explicit.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{error, info, warn};

use crate::error::IndexError;
use crate::events::EventLog;
use crate::tips::validate_pi;
use crate::types::{EventKind, QueuedEvent};

/// Ingest queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Bounded channel capacity.
    pub capacity: usize,
    /// Max events per batch.
    pub batch_size: usize,
    /// Max wait for more items after the first, before committing a
    /// partial batch.
    pub batch_timeout: Duration,
    /// How long shutdown waits for the worker to drain the queue.
    pub shutdown_grace: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            batch_size: 50,
            batch_timeout: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(60),
        }
    }
}

/// Queue statistics for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
}

/// Client handle: submit events, read statistics.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<QueuedEvent>,
    depth: Arc<AtomicUsize>,
    config: QueueConfig,
}

impl IngestQueue {
    /// Accept an event for asynchronous processing. Returns once queued;
    /// the write to the store happens in the background worker.
    pub fn enqueue(
        &self,
        kind: EventKind,
        pi: &str,
        ver: u64,
        tip_cid: &str,
    ) -> Result<(), IndexError> {
        validate_pi(pi)?;
        let item = QueuedEvent::new(kind, pi, ver, tip_cid);
        match self.tx.try_send(item) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(IndexError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(IndexError::QueueClosed),
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queue_size: self.depth.load(Ordering::SeqCst),
            batch_size: self.config.batch_size,
            batch_timeout_ms: self.config.batch_timeout.as_millis() as u64,
        }
    }
}

/// Owner handle for the background worker task.
pub struct WorkerHandle {
    worker: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    depth: Arc<AtomicUsize>,
    grace: Duration,
}

impl WorkerHandle {
    /// Signal shutdown and wait for the worker to drain the queue, bounded
    /// by the grace period. On grace expiry remaining items are lost and
    /// counted in the log.
    pub async fn shutdown(mut self) {
        let pending = self.depth.load(Ordering::SeqCst);
        if pending > 0 {
            info!(pending, "stopping event worker with items in queue");
        }
        self.shutdown.store(true, Ordering::SeqCst);

        match timeout(self.grace, &mut self.worker).await {
            Ok(_) => info!("event queue worker stopped cleanly"),
            Err(_) => {
                self.worker.abort();
                warn!(
                    lost = self.depth.load(Ordering::SeqCst),
                    "worker shutdown grace expired, remaining events lost"
                );
            }
        }
    }
}

/// Start the queue and its batch worker.
pub fn start(log: Arc<EventLog>, config: QueueConfig) -> (IngestQueue, WorkerHandle) {
    let (tx, rx) = mpsc::channel(config.capacity);
    let depth = Arc::new(AtomicUsize::new(0));
    let shutdown = Arc::new(AtomicBool::new(false));

    let worker = Worker {
        rx,
        depth: depth.clone(),
        shutdown: shutdown.clone(),
        log,
        config: config.clone(),
    };
    let handle = tokio::spawn(worker.run());

    (
        IngestQueue {
            tx,
            depth: depth.clone(),
            config: config.clone(),
        },
        WorkerHandle {
            worker: handle,
            shutdown,
            depth,
            grace: config.shutdown_grace,
        },
    )
}

struct Worker {
    rx: mpsc::Receiver<QueuedEvent>,
    depth: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    log: Arc<EventLog>,
    config: QueueConfig,
}

impl Worker {
    async fn run(mut self) {
        info!(
            batch_size = self.config.batch_size,
            batch_timeout_ms = self.config.batch_timeout.as_millis() as u64,
            "event queue worker running"
        );

        loop {
            if self.shutdown.load(Ordering::SeqCst) && self.depth.load(Ordering::SeqCst) == 0 {
                break;
            }

            // Wait for the first item, waking every second to re-check the
            // shutdown flag.
            let first = match timeout(Duration::from_secs(1), self.rx.recv()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => continue,
            };

            let mut batch = vec![first];
            let deadline = Instant::now() + self.config.batch_timeout;
            while batch.len() < self.config.batch_size {
                match timeout_at(deadline, self.rx.recv()).await {
                    Ok(Some(item)) => batch.push(item),
                    Ok(None) | Err(_) => break,
                }
            }

            self.process(batch).await;
        }

        info!("event queue worker finished");
    }

    async fn process(&self, batch: Vec<QueuedEvent>) {
        let len = batch.len();
        match self.log.append_batch(batch).await {
            Ok(outcome) => {
                if outcome.failed > 0 {
                    warn!(failed = outcome.failed, written = outcome.written, "batch had failures");
                }
            }
            Err(e) => error!(error = %e, dropped = len, "batch processing failed"),
        }
        // Every slot is released even on failure so depth accounting and
        // shutdown draining stay correct.
        self.depth.fetch_sub(len, Ordering::SeqCst);
    }
}
