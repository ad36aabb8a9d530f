//! JSON API handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use super::error_response;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HashData {
    pub hash: String,
    pub object_id: String,
}

#[derive(Debug, Serialize)]
pub struct HashResponse {
    pub data: HashData,
    pub status_code: u16,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub objects: usize,
    pub started_at: String,
    pub uptime_seconds: i64,
}

pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "message": "pong" }))
}

pub async fn server_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        objects: state.catalog.len(),
        started_at: state.started_at.to_rfc3339(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// Returns the link hash that must accompany stream URLs for an object.
pub async fn object_hash(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(object) = state.catalog.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, format!("file {id} not found"));
    };

    Json(HashResponse {
        data: HashData {
            hash: object.link_hash(state.link_hash_length),
            object_id: id,
        },
        status_code: StatusCode::OK.as_u16(),
    })
    .into_response()
}

/// Queues a background inspection and returns immediately.
///
/// The verdict is only logged; a failed inspection counts as not flagged.
pub async fn inspect_object(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(object) = state.catalog.get(&id).cloned() else {
        return error_response(StatusCode::NOT_FOUND, format!("file {id} not found"));
    };

    let inspector = state.inspector.clone();
    let task_id = id.clone();
    tokio::spawn(async move {
        let flagged = inspector.inspect(&object).await;
        tracing::info!(id = %task_id, flagged, "Inspection finished");
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "object_id": id })),
    )
        .into_response()
}
