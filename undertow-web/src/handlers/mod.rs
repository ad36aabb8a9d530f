//! HTTP request handlers organized by functionality

pub mod api;
pub mod stream;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

pub use api::{
    HashData, HashResponse, StatusResponse, inspect_object, object_hash, ping, server_status,
};
pub use stream::{StreamQuery, stream_object};

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}
