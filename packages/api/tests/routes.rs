//! Router tests over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use cairn_api::AppState;
use cairn_index::{queue, EventLog, PointerStore, QueueConfig};
use cairn_store::testing::MemStore;
use cairn_store::{DagPutOpts, Store};

const POINTER_PATH: &str = "/cairn/index-pointer";

struct Fixture {
    store: Arc<MemStore>,
    pointer: PointerStore,
    app: Router,
    _worker: cairn_index::WorkerHandle,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemStore::new());
    let pointer = PointerStore::new(store.clone() as Arc<dyn Store>, POINTER_PATH);
    let log = Arc::new(EventLog::new(store.clone(), pointer.clone()));
    let (ingest, worker) = queue::start(
        log.clone(),
        QueueConfig {
            batch_timeout: Duration::from_millis(10),
            ..QueueConfig::default()
        },
    );
    let state = Arc::new(AppState {
        store: store.clone() as Arc<dyn Store>,
        pointer: pointer.clone(),
        log,
        queue: ingest,
    });
    Fixture {
        store,
        pointer,
        app: cairn_api::router(state),
        _worker: worker,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn wait_for_events(fixture: &Fixture, expected: u64) {
    for _ in 0..200 {
        if fixture.pointer.read().await.unwrap().event_count >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {expected} events");
}

#[tokio::test]
async fn test_health() {
    let f = fixture();
    let response = f.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "healthy"}));
}

#[tokio::test]
async fn test_pointer_route_returns_zero_pointer_on_fresh_store() {
    let f = fixture();
    let response = f.app.clone().oneshot(get("/index-pointer")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["event_count"], 0);
    assert_eq!(body["total_count"], 0);
    assert_eq!(body["event_head"], Value::Null);
    assert_eq!(body["schema"], "cairn/index-pointer@v2");
}

#[tokio::test]
async fn test_append_then_list_events() {
    let f = fixture();

    let response = f
        .app
        .clone()
        .oneshot(post_json(
            "/events/append",
            json!({"type": "create", "pi": "01AAAAAA", "ver": 1, "tip_cid": "bafy-mA1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"queued": true, "success": true})
    );

    wait_for_events(&f, 1).await;

    let response = f.app.clone().oneshot(get("/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_events"], 1);
    assert_eq!(body["total_pis"], 1);
    assert_eq!(body["has_more"], false);
    assert_eq!(body["items"][0]["pi"], "01AAAAAA");
    assert_eq!(body["items"][0]["type"], "create");
    assert_eq!(body["items"][0]["tip_cid"], "bafy-mA1");
}

#[tokio::test]
async fn test_events_pagination_reports_cursor() {
    let f = fixture();
    for i in 0..3 {
        f.app
            .clone()
            .oneshot(post_json(
                "/events/append",
                json!({"type": "create", "pi": format!("01AA{i:04}"), "ver": 1, "tip_cid": "bafy-m"}),
            ))
            .await
            .unwrap();
    }
    wait_for_events(&f, 3).await;

    let response = f.app.clone().oneshot(get("/events?limit=2")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    let response = f
        .app
        .clone()
        .oneshot(get(&format!("/events?limit=2&cursor={cursor}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn test_append_rejects_short_pi() {
    let f = fixture();
    let response = f
        .app
        .clone()
        .oneshot(post_json(
            "/events/append",
            json!({"type": "create", "pi": "ab", "ver": 1, "tip_cid": "bafy-m"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_append_rejects_unknown_kind() {
    let f = fixture();
    let response = f
        .app
        .clone()
        .oneshot(post_json(
            "/events/append",
            json!({"type": "delete", "pi": "01AAAAAA", "ver": 1, "tip_cid": "bafy-m"}),
        ))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_queue_stats_route() {
    let f = fixture();
    let response = f
        .app
        .clone()
        .oneshot(get("/events/queue-stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["batch_size"], 50);
    assert_eq!(body["batch_timeout_ms"], 10);
    assert!(body["queue_size"].is_u64());
}

#[tokio::test]
async fn test_snapshot_latest_404_when_absent() {
    let f = fixture();
    let response = f
        .app
        .clone()
        .oneshot(get("/snapshot/latest"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_snapshot_latest_streams_with_headers() {
    let f = fixture();

    // Seed a stored snapshot and point the pointer at it.
    let snapshot = json!({
        "schema": "cairn/snapshot@v2",
        "seq": 4,
        "ts": "2026-01-01T00:00:00Z",
        "event_cid": "bafyhead",
        "total_count": 2,
        "entries": [],
    });
    let cid = f
        .store
        .dag_put(&snapshot, DagPutOpts::json())
        .await
        .unwrap();
    let mut pointer = f.pointer.read().await.unwrap();
    pointer.latest_snapshot_cid = Some(cid.clone());
    pointer.snapshot_seq = 4;
    pointer.snapshot_count = 2;
    f.pointer.write(&mut pointer, None).await.unwrap();

    let response = f
        .app
        .clone()
        .oneshot(get("/snapshot/latest"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["X-Snapshot-CID"], cid.as_str());
    assert_eq!(response.headers()["X-Snapshot-Seq"], "4");
    assert_eq!(response.headers()["X-Snapshot-Count"], "2");

    let body = body_json(response).await;
    assert_eq!(body["seq"], 4);
}

#[tokio::test]
async fn test_rebuild_stub_responds() {
    let f = fixture();
    let response = f
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/snapshot/rebuild")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("scheduler"));
}
