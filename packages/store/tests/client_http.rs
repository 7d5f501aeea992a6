//! HTTP-level tests for `StoreClient` against a mock store API.

use cairn_store::{DagPutOpts, FilesWriteOpts, Store, StoreClient};
use futures::TryStreamExt;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_dag_put_parses_cid_and_pins() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dag/put"))
        .and(query_param("store-codec", "dag-cbor"))
        .and(query_param("input-codec", "json"))
        .and(query_param("pin", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Cid": {"/": "bafyevent1"}})))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    let cid = client
        .dag_put(&json!({"pi": "ABCD", "ver": 1}), DagPutOpts::cbor())
        .await
        .unwrap();
    assert_eq!(cid, "bafyevent1");
}

#[tokio::test]
async fn test_dag_put_big_block_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dag/put"))
        .and(query_param("store-codec", "dag-json"))
        .and(query_param("allow-big-block", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Cid": {"/": "bafysnap"}})))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    let cid = client
        .dag_put(&json!({"seq": 1}), DagPutOpts::json().with_big_block())
        .await
        .unwrap();
    assert_eq!(cid, "bafysnap");
}

#[tokio::test]
async fn test_dag_put_unexpected_body_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dag/put"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nope": true})))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    let err = client
        .dag_put(&json!({}), DagPutOpts::cbor())
        .await
        .unwrap_err();
    assert!(matches!(err, cairn_store::StoreError::Protocol(_)));
}

#[tokio::test]
async fn test_dag_get_returns_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dag/get"))
        .and(query_param("arg", "bafyevent1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pi": "ABCD", "ver": 2})))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    let doc = client.dag_get("bafyevent1").await.unwrap();
    assert_eq!(doc["ver"], 2);
}

#[tokio::test]
async fn test_files_read_missing_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files/read"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"Message": "file does not exist", "Code": 0})),
        )
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    let err = client.files_read("/cairn/index-pointer").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_files_read_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files/read"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    let err = client.files_read("/cairn/index-pointer").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_files_write_sends_flags_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files/write"))
        .and(query_param("arg", "/cairn/index-pointer"))
        .and(query_param("create", "true"))
        .and(query_param("truncate", "true"))
        .and(query_param("parents", "true"))
        .and(body_string_contains("event_count"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    client
        .files_write(
            "/cairn/index-pointer",
            br#"{"event_count":0}"#.to_vec(),
            FilesWriteOpts::default(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_files_mkdir_sends_parents_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files/mkdir"))
        .and(query_param("arg", "/cairn/index/01/AB"))
        .and(query_param("parents", "true"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    client.files_mkdir("/cairn/index/01/AB", true).await.unwrap();
}

#[tokio::test]
async fn test_dag_export_streams_archive_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dag/export"))
        .and(query_param("arg", "bafysnap"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"CARv1-bytes".to_vec()))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    let stream = client.dag_export("bafysnap").await.unwrap();
    let chunks: Vec<_> = stream.try_collect().await.unwrap();
    assert_eq!(chunks.concat(), b"CARv1-bytes");
}

#[tokio::test]
async fn test_dag_get_stream_yields_raw_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dag/get"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"seq":7}"#))
        .mount(&server)
        .await;

    let client = StoreClient::new(server.uri()).unwrap();
    let stream = client.dag_get_stream("bafysnap").await.unwrap();
    let chunks: Vec<_> = stream.try_collect().await.unwrap();
    let body: Vec<u8> = chunks.concat();
    assert_eq!(body, br#"{"seq":7}"#);
}
