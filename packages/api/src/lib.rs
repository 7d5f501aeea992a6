//! Cairn HTTP surface.
//!
//! A thin façade over the index: enqueue events, walk the chain, read the
//! pointer, stream the latest snapshot. All heavy lifting happens in the
//! `cairn-index` and `cairn-snapshot` crates; handlers translate between
//! HTTP and those components.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use cairn_index::{EventLog, IngestQueue, PointerStore};
use cairn_store::Store;

pub use config::{Config, ConfigError};
pub use error::ApiError;

/// Shared handler state.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub pointer: PointerStore,
    pub log: Arc<EventLog>,
    pub queue: IngestQueue,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/events", get(routes::list_events))
        .route("/events/append", post(routes::append_event))
        .route("/events/queue-stats", get(routes::queue_stats))
        .route("/index-pointer", get(routes::get_pointer))
        .route("/snapshot/latest", get(routes::snapshot_latest))
        .route("/snapshot/rebuild", post(routes::rebuild_snapshot))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
