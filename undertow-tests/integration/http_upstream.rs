//! Integration tests for the HTTP chunk client
//!
//! Starts a small axum upstream on a loopback port that answers single
//! range requests, then talks to it through `HttpChunkClient`.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::stream;
use undertow_core::config::{StoreConfig, UpstreamConfig};
use undertow_core::store::HttpChunkClient;
use undertow_core::streaming::{ByteWindow, RangeStreamReader};
use undertow_core::{ChunkClientError, ObjectLocation, RemoteChunkClient, StoreLimits};
use undertow_sim::deterministic_content;

type Objects = Arc<HashMap<String, Bytes>>;

fn parse_range(headers: &HeaderMap) -> Option<(usize, usize)> {
    let value = headers.get(RANGE)?.to_str().ok()?;
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn ranged(
    State(objects): State<Objects>,
    Path(location): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(data) = objects.get(&location) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some((start, end)) = parse_range(&headers) else {
        return (StatusCode::OK, data.clone()).into_response();
    };
    if start >= data.len() {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }
    let end = end.min(data.len() - 1);
    (
        StatusCode::PARTIAL_CONTENT,
        [(CONTENT_RANGE, format!("bytes {start}-{end}/{}", data.len()))],
        data.slice(start..=end),
    )
        .into_response()
}

async fn ignores_range(State(objects): State<Objects>, Path(location): Path<String>) -> Response {
    match objects.get(&location) {
        Some(data) => (StatusCode::OK, data.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Body that never ends, sent without a length.
fn endless_body() -> Body {
    Body::from_stream(stream::repeat_with(|| {
        Ok::<_, io::Error>(Bytes::from(vec![0u8; 64 * 1024]))
    }))
}

async fn endless_full(Path(_): Path<String>) -> Response {
    (StatusCode::OK, endless_body()).into_response()
}

async fn endless_partial(Path(_): Path<String>) -> Response {
    (
        StatusCode::PARTIAL_CONTENT,
        [(CONTENT_RANGE, "bytes 0-4095/10000")],
        endless_body(),
    )
        .into_response()
}

async fn spawn_upstream(objects: Objects) -> String {
    let app = Router::new()
        .route("/objects/{location}", get(ranged))
        .route("/plain/{location}", get(ignores_range))
        .route("/endless/{location}", get(endless_full))
        .route("/overlong/{location}", get(endless_partial))
        .with_state(objects);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn setup(prefix: &str) -> (HttpChunkClient, Bytes) {
    let data = deterministic_content(5, 10_000);
    let objects: Objects = Arc::new(HashMap::from([("clip-1".to_string(), data.clone())]));
    let base = spawn_upstream(objects).await;

    let upstream = UpstreamConfig {
        base_url: format!("{base}/{prefix}"),
        ..Default::default()
    };
    let client = HttpChunkClient::new(&upstream, &StoreConfig::default()).unwrap();
    (client, data)
}

#[tokio::test]
async fn test_fetches_aligned_span() {
    let (client, data) = setup("objects").await;
    let location = ObjectLocation::new("clip-1");

    let chunk = client.fetch(&location, 4096, 4096).await.unwrap();
    assert_eq!(chunk, data.slice(4096..8192));
}

#[tokio::test]
async fn test_short_read_at_object_end() {
    let (client, data) = setup("objects").await;
    let location = ObjectLocation::new("clip-1");

    let chunk = client.fetch(&location, 8192, 4096).await.unwrap();
    assert_eq!(chunk, data.slice(8192..));

    let past_end = client.fetch(&location, 12_288, 4096).await.unwrap();
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn test_unknown_object() {
    let (client, _) = setup("objects").await;
    let result = client.fetch(&ObjectLocation::new("missing"), 0, 4096).await;
    assert!(matches!(result, Err(ChunkClientError::ObjectNotFound { .. })));
}

#[tokio::test]
async fn test_upstream_ignoring_range_past_start_is_rejected() {
    let (client, _) = setup("plain").await;
    let location = ObjectLocation::new("clip-1");

    let result = client.fetch(&location, 4096, 4096).await;
    assert!(matches!(result, Err(ChunkClientError::Transport { .. })));
}

#[tokio::test]
async fn test_upstream_full_body_larger_than_limit_is_protocol_error() {
    let (client, _) = setup("plain").await;
    let location = ObjectLocation::new("clip-1");

    let result = client.fetch(&location, 0, 4096).await;
    assert!(matches!(result, Err(ChunkClientError::Protocol { .. })));
}

#[tokio::test]
async fn test_unbounded_body_is_cut_off_at_limit() {
    for prefix in ["endless", "overlong"] {
        let (client, _) = setup(prefix).await;
        let location = ObjectLocation::new("clip-1");

        // Well inside the 30 s request timeout; a buffering client would
        // only give up when that timeout fires.
        let result = tokio::time::timeout(Duration::from_secs(5), client.fetch(&location, 0, 4096))
            .await
            .expect("fetch should stop reading once the limit is passed");
        assert!(
            matches!(result, Err(ChunkClientError::Protocol { .. })),
            "{prefix}: {result:?}"
        );
    }
}

#[tokio::test]
async fn test_range_reader_over_http() {
    let (client, data) = setup("objects").await;
    let mut reader = RangeStreamReader::new(
        Arc::new(client),
        ObjectLocation::new("clip-1"),
        ByteWindow::new(1234, 9876, 10_000).unwrap(),
        StoreLimits::default(),
    );

    let mut out = Vec::new();
    let mut buf = vec![0u8; 3000];
    loop {
        let count = reader.read(&mut buf).await.unwrap();
        if count == 0 {
            break;
        }
        out.extend_from_slice(&buf[..count]);
    }
    assert_eq!(Bytes::from(out), data.slice(1234..=9876));
}
