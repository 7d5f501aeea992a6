//! Route handlers.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use cairn_index::{EventKind, EventRecord, IndexPointer, QueueStats};
use cairn_store::StoreError;

use crate::error::ApiError;
use crate::AppState;

const DEFAULT_EVENTS_LIMIT: usize = 50;
const MAX_EVENTS_LIMIT: usize = 1000;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub items: Vec<EventRecord>,
    pub total_events: u64,
    pub total_pis: u64,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENTS_LIMIT)
        .min(MAX_EVENTS_LIMIT);

    let pointer = state.pointer.read().await?;
    let page = state.log.query(limit, query.cursor.as_deref()).await?;

    Ok(Json(EventsResponse {
        items: page.items,
        total_events: pointer.event_count,
        total_pis: pointer.total_count,
        has_more: page.next_cursor.is_some(),
        next_cursor: page.next_cursor,
    }))
}

pub async fn get_pointer(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IndexPointer>, ApiError> {
    Ok(Json(state.pointer.read().await?))
}

#[derive(Debug, Deserialize)]
pub struct AppendEventRequest {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub pi: String,
    pub ver: u64,
    pub tip_cid: String,
}

#[derive(Debug, Serialize)]
pub struct AppendAccepted {
    pub queued: bool,
    pub success: bool,
}

/// Accept an event into the ingest queue. Returns as soon as the item is
/// queued; the chain write happens in the batch worker.
pub async fn append_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AppendEventRequest>,
) -> Result<Json<AppendAccepted>, ApiError> {
    state
        .queue
        .enqueue(request.kind, &request.pi, request.ver, &request.tip_cid)?;
    Ok(Json(AppendAccepted {
        queued: true,
        success: true,
    }))
}

pub async fn queue_stats(State(state): State<Arc<AppState>>) -> Json<QueueStats> {
    Json(state.queue.stats())
}

/// Stream the latest snapshot document. Snapshots can run past 100 MB, so
/// the body is proxied through rather than buffered.
pub async fn snapshot_latest(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let pointer = state.pointer.read().await?;
    let cid = pointer
        .latest_snapshot_cid
        .ok_or_else(|| ApiError::NotFound("no snapshot available".to_string()))?;

    let stream = state.store.dag_get_stream(&cid).await.map_err(|e| match e {
        StoreError::NotFound(_) => ApiError::NotFound("snapshot object missing".to_string()),
        StoreError::Transient(msg) => ApiError::Unavailable(msg),
        other => ApiError::Internal(other.into()),
    })?;

    Response::builder()
        .header(CONTENT_TYPE, "application/json")
        .header("X-Snapshot-CID", &cid)
        .header("X-Snapshot-Seq", pointer.snapshot_seq.to_string())
        .header("X-Snapshot-Count", pointer.snapshot_count.to_string())
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))
}

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub message: &'static str,
}

/// Manual trigger stub. Builds run on the internal scheduler.
pub async fn rebuild_snapshot() -> Json<RebuildResponse> {
    Json(RebuildResponse {
        message: "snapshot builds run on the internal scheduler; check /index-pointer for the latest snapshot",
    })
}
