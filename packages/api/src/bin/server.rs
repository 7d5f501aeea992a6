//! Cairn index server.
//!
//! Wires the store gateway, event log, ingest queue, snapshot scheduler
//! and HTTP router together, then serves until interrupted. The ingest
//! queue drains within its grace period on shutdown.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cairn_api::{AppState, Config};
use cairn_index::{queue, EventLog, PointerStore, QueueConfig};
use cairn_snapshot::{SchedulerConfig, SnapshotBuilder, SnapshotConfig, SnapshotScheduler};
use cairn_store::{Store, StoreClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let snapshot_config = SnapshotConfig {
        work_dir: config.snapshot_work_dir.clone(),
        snapshots_dir: config.snapshots_dir.clone(),
        ..SnapshotConfig::default()
    };
    // Discard partial state a crashed build may have left behind.
    cairn_snapshot::cleanup_workdir(&snapshot_config);

    let store: Arc<dyn Store> = Arc::new(StoreClient::new(&config.store_api_url)?);
    let pointer = PointerStore::new(store.clone(), config.index_pointer_path.clone());
    let log = Arc::new(EventLog::new(store.clone(), pointer.clone()));

    let (ingest, worker) = queue::start(
        log.clone(),
        QueueConfig {
            capacity: config.queue_capacity,
            batch_size: config.batch_size,
            batch_timeout: config.batch_timeout,
            shutdown_grace: config.shutdown_grace,
        },
    );

    let builder = Arc::new(SnapshotBuilder::new(
        store.clone(),
        pointer.clone(),
        snapshot_config,
    ));
    let _scheduler = SnapshotScheduler::new(
        builder,
        pointer.clone(),
        SchedulerConfig {
            interval: config.snapshot_interval,
            enabled: config.auto_snapshot,
        },
    )
    .spawn();

    let state = Arc::new(AppState {
        store,
        pointer,
        log,
        queue: ingest,
    });
    let app = cairn_api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🗿 cairn index server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("http server stopped, draining ingest queue");
    worker.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
