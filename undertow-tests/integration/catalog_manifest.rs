//! Integration tests for application state built from a manifest or the demo store

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use undertow_core::RuntimeMode;
use undertow_core::config::UndertowConfig;
use undertow_web::{AppState, ServerError, build_router};

const MANIFEST: &str = r#"{
    "objects": [
        { "id": "7", "location": "chan-1/msg-7", "size": 52428800, "name": "lecture.mkv" },
        { "id": "8", "location": "chan-1/msg-8", "size": 1024, "mime_type": "image/png", "name": "cover" }
    ]
}"#;

#[tokio::test]
async fn test_production_state_loads_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, MANIFEST).unwrap();

    let mut config = UndertowConfig::default();
    config.server.catalog_path = Some(path);

    let state = AppState::production(&config).await.unwrap();
    assert_eq!(state.catalog.len(), 2);
    assert_eq!(state.catalog.get("7").unwrap().content_type(), "video/x-matroska");
    assert_eq!(state.catalog.get("8").unwrap().content_type(), "image/png");

    let response = build_router(state)
        .oneshot(Request::builder().uri("/api/v1/hash/7").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["data"]["hash"].as_str().unwrap().len(), 6);
}

#[tokio::test]
async fn test_missing_manifest_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = UndertowConfig::default();
    config.server.catalog_path = Some(dir.path().join("absent.json"));

    let result = AppState::production(&config).await;
    assert!(matches!(result, Err(ServerError::Catalog(_))));
}

#[tokio::test]
async fn test_invalid_upstream_fails_startup() {
    let mut config = UndertowConfig::default();
    config.upstream.base_url = "::not a url::".to_string();

    let result = AppState::production(&config).await;
    assert!(matches!(result, Err(ServerError::Config(_))));
}

#[tokio::test]
async fn test_demo_state_streams_generated_objects() {
    let config = UndertowConfig::for_testing();
    let state = AppState::for_mode(&config, RuntimeMode::Demo).await.unwrap();

    let id = state.catalog.ids().first().unwrap().to_string();
    let object = state.catalog.get(&id).unwrap().clone();
    let uri = format!("/stream/{id}/{}", object.link_hash(state.link_hash_length));

    let response = build_router(state)
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("range", "bytes=0-15")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(to_bytes(response.into_body(), usize::MAX).await.unwrap().len(), 16);
}
