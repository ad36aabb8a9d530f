//! Range streaming handler.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use undertow_core::streaming::{
    Disposition, RangeError, RangeStreamReader, negotiate, unsatisfied_content_range,
};

use super::error_response;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Serve as an attachment instead of inline.
    #[serde(default)]
    pub download: bool,
}

/// Streams an object, honouring a single `Range` clause.
///
/// The link hash must match the object. Every rejection happens before the
/// response head is built; once the body starts, a store failure truncates
/// it.
pub async fn stream_object(
    State(state): State<AppState>,
    Path((id, hash)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(object) = state.catalog.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, format!("file {id} not found"));
    };
    if !object.verify_link_hash(&hash, state.link_hash_length) {
        tracing::debug!(%id, "Rejected stream request with invalid link hash");
        return error_response(StatusCode::FORBIDDEN, "invalid hash");
    }

    let range = match headers.get(RANGE).map(|value| value.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => {
            let error = RangeError::Malformed {
                header: "<non-ascii>".to_string(),
            };
            return range_error_response(&error, object.size());
        }
    };

    let disposition = if query.download {
        Disposition::Attachment
    } else {
        Disposition::Inline
    };

    let negotiation = match negotiate(range, object, disposition) {
        Ok(negotiation) => negotiation,
        Err(e) => {
            tracing::debug!(%id, ?range, error = %e, "Range negotiation failed");
            return range_error_response(&e, object.size());
        }
    };

    tracing::info!(
        %id,
        start = negotiation.window.start(),
        end = negotiation.window.end(),
        partial = negotiation.is_partial(),
        "Streaming object"
    );

    let reader = RangeStreamReader::new(
        Arc::clone(&state.client),
        object.location().clone(),
        negotiation.window,
        state.limits,
    )
    .with_cancellation(&state.shutdown);

    let mut response = Body::from_stream(reader.into_body_stream(state.stream_buffer_size))
        .into_response();
    *response.status_mut() = negotiation.status;
    *response.headers_mut() = negotiation.headers;
    response
}

fn range_error_response(error: &RangeError, size: u64) -> Response {
    let mut response = error_response(error.status_code(), error.to_string());
    response
        .headers_mut()
        .insert(CONTENT_RANGE, unsatisfied_content_range(size));
    response
}
