//! Integration tests for range streaming through the HTTP router
//!
//! Drives the axum router with `oneshot` requests against the in-memory
//! store and checks status lines, headers and bodies byte for byte.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode};
use bytes::Bytes;
use tower::ServiceExt;
use undertow_core::config::UndertowConfig;
use undertow_core::sampling::{ContentInspector, StubClassifier};
use undertow_core::{RemoteChunkClient, RemoteObjectHandle};
use undertow_sim::{Fault, InMemoryChunkStore, SimulatedFrameExtractor, deterministic_content};
use undertow_web::{AppState, ObjectCatalog, build_router};

const OBJECT_SIZE: usize = 1000;

struct Harness {
    app: Router,
    state: AppState,
    store: Arc<InMemoryChunkStore>,
    object: RemoteObjectHandle,
    data: Bytes,
}

impl Harness {
    fn new() -> Self {
        let config = UndertowConfig::for_testing();
        let store = Arc::new(InMemoryChunkStore::new((&config.store).into()));
        let data = deterministic_content(42, OBJECT_SIZE);
        let object = store.add_object("doc-1", data.clone(), Some("video/mp4"), "clip.mp4");

        let mut catalog = ObjectCatalog::new();
        catalog.insert("1", object.clone());

        let client: Arc<dyn RemoteChunkClient> = store.clone();
        let inspector = ContentInspector::new(
            Arc::clone(&client),
            (&config.store).into(),
            Arc::new(SimulatedFrameExtractor::new()),
            Arc::new(StubClassifier),
            &config.inspection,
        );
        let state = AppState::new(&config, catalog, client, inspector);

        Self {
            app: build_router(state.clone()),
            state,
            store,
            object,
            data,
        }
    }

    fn stream_uri(&self) -> String {
        format!("/stream/1/{}", self.object.link_hash(6))
    }

    async fn get(&self, uri: &str, range: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(range) = range {
            request = request.header("range", range);
        }
        self.app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

async fn body_bytes(response: Response<Body>) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

#[tokio::test]
async fn test_full_object_without_range() {
    let harness = Harness::new();
    let response = harness.get(&harness.stream_uri(), None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-length"), Some("1000"));
    assert_eq!(header(&response, "accept-ranges"), Some("bytes"));
    assert_eq!(header(&response, "content-type"), Some("video/mp4"));
    assert!(header(&response, "content-range").is_none());
    assert_eq!(body_bytes(response).await, harness.data);
}

#[tokio::test]
async fn test_bounded_range() {
    let harness = Harness::new();
    let response = harness
        .get(&harness.stream_uri(), Some("bytes=100-199"))
        .await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, "content-range"), Some("bytes 100-199/1000"));
    assert_eq!(header(&response, "content-length"), Some("100"));
    assert_eq!(body_bytes(response).await, harness.data.slice(100..200));
}

#[tokio::test]
async fn test_overrunning_range_is_clamped() {
    let harness = Harness::new();
    let response = harness
        .get(&harness.stream_uri(), Some("bytes=900-2000"))
        .await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, "content-range"), Some("bytes 900-999/1000"));
    assert_eq!(body_bytes(response).await, harness.data.slice(900..));
}

#[tokio::test]
async fn test_suffix_range() {
    let harness = Harness::new();
    let response = harness.get(&harness.stream_uri(), Some("bytes=-10")).await;

    assert_eq!(header(&response, "content-range"), Some("bytes 990-999/1000"));
    assert_eq!(body_bytes(response).await, harness.data.slice(990..));
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let harness = Harness::new();
    let response = harness
        .get(&harness.stream_uri(), Some("bytes=2000-3000"))
        .await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(header(&response, "content-range"), Some("bytes */1000"));
    assert_eq!(harness.store.fetch_count(), 0);
}

#[tokio::test]
async fn test_malformed_range_is_rejected_before_streaming() {
    let harness = Harness::new();
    let response = harness.get(&harness.stream_uri(), Some("items=0-10")).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("malformed"));
    assert_eq!(harness.store.fetch_count(), 0);
}

#[tokio::test]
async fn test_wrong_hash_is_forbidden() {
    let harness = Harness::new();
    let response = harness.get("/stream/1/ffffff", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_object_is_not_found() {
    let harness = Harness::new();
    let response = harness.get("/stream/99/abcdef", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_sets_attachment() {
    let harness = Harness::new();
    let uri = format!("{}?download=true", harness.stream_uri());
    let response = harness.get(&uri, None).await;

    assert_eq!(
        header(&response, "content-disposition"),
        Some("attachment; filename=\"clip.mp4\"")
    );
}

#[tokio::test]
async fn test_store_sees_only_aligned_bounded_fetches() {
    let harness = Harness::new();
    let response = harness
        .get(&harness.stream_uri(), Some("bytes=37-811"))
        .await;
    assert_eq!(body_bytes(response).await, harness.data.slice(37..812));

    let limits = harness.store.limits();
    let log = harness.store.fetch_log();
    assert!(!log.is_empty());
    for record in log {
        assert_eq!(record.offset % limits.alignment(), 0);
        assert!(record.limit <= limits.max_request_size());
        assert!(record.returned.is_some());
    }
}

#[tokio::test]
async fn test_store_failure_truncates_body() {
    let harness = Harness::new();
    harness.store.inject_fault(2, Fault::Transport);

    let response = harness.get(&harness.stream_uri(), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
    assert_eq!(harness.store.fetch_count(), 3);
}

#[tokio::test]
async fn test_shutdown_ends_open_streams() {
    let harness = Harness::new();
    harness.state.shutdown.cancel();

    let response = harness.get(&harness.stream_uri(), None).await;
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
    assert_eq!(harness.store.fetch_count(), 0);
}

#[tokio::test]
async fn test_hash_endpoint() {
    let harness = Harness::new();
    let response = harness.get("/api/v1/hash/1", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status_code"], 200);
    assert_eq!(body["data"]["object_id"], "1");
    assert_eq!(body["data"]["hash"], harness.object.link_hash(6));

    let missing = harness.get("/api/v1/hash/404", None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_inspect_endpoint_accepts() {
    let harness = Harness::new();
    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/inspect/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_status_endpoint() {
    let harness = Harness::new();
    let response = harness.get("/api/v1/status", None).await;

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["objects"], 1);
}
