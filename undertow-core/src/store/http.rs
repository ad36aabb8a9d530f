//! HTTP-backed remote chunk client
//!
//! Talks to an upstream that exposes objects at `{base_url}/{location}` and
//! honours single `Range` requests. The store's alignment and per-call rules
//! are enforced locally before anything goes on the wire.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::StatusCode;
use reqwest::header::RANGE;
use url::Url;

use super::{ChunkClientError, RemoteChunkClient, StoreLimits};
use crate::config::{ConfigError, StoreConfig, UpstreamConfig};
use crate::object::ObjectLocation;

/// Remote chunk client speaking HTTP range requests.
#[derive(Debug, Clone)]
pub struct HttpChunkClient {
    base_url: Url,
    limits: StoreLimits,
    client: reqwest::Client,
}

impl HttpChunkClient {
    /// Creates a client for the configured upstream.
    ///
    /// # Errors
    /// - `ConfigError::InvalidBaseUrl` - Base URL does not parse
    /// - `ConfigError::HttpClient` - TLS backend or client setup failed
    pub fn new(upstream: &UpstreamConfig, store: &StoreConfig) -> Result<Self, ConfigError> {
        let mut base = upstream.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| ConfigError::InvalidBaseUrl {
            url: upstream.base_url.clone(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(store.request_timeout)
            .user_agent(upstream.user_agent)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;

        Ok(Self {
            base_url,
            limits: StoreLimits::from(store),
            client,
        })
    }

    /// Resolves the URL of an object.
    ///
    /// # Errors
    /// - `ChunkClientError::Protocol` - Location cannot form a valid URL
    pub fn object_url(&self, location: &ObjectLocation) -> Result<Url, ChunkClientError> {
        let segment = urlencoding::encode(location.as_str());
        self.base_url
            .join(&segment)
            .map_err(|e| ChunkClientError::Protocol {
                reason: format!("location {location} does not form a URL: {e}"),
            })
    }
}

/// `Range` header value for `limit` bytes at `offset`.
fn range_header(offset: u64, limit: u64) -> String {
    format!("bytes={}-{}", offset, offset + limit - 1)
}

fn oversized(offset: u64, limit: u64, received: u64) -> ChunkClientError {
    ChunkClientError::Protocol {
        reason: format!("asked for {limit} bytes at offset {offset}, received {received}"),
    }
}

fn map_transport_error(error: reqwest::Error, offset: u64) -> ChunkClientError {
    if error.is_timeout() {
        ChunkClientError::Timeout { offset }
    } else {
        ChunkClientError::Transport {
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl RemoteChunkClient for HttpChunkClient {
    async fn fetch(
        &self,
        location: &ObjectLocation,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes, ChunkClientError> {
        self.limits.check_request(offset, limit)?;
        let url = self.object_url(location)?;

        tracing::trace!(%location, offset, limit, "Fetching chunk");

        let mut response = self
            .client
            .get(url)
            .header(RANGE, range_header(offset, limit))
            .send()
            .await
            .map_err(|e| map_transport_error(e, offset))?;

        let status = response.status();
        match status {
            StatusCode::PARTIAL_CONTENT => {}
            // The upstream ignored the range; acceptable only when the whole
            // object starts here and fits in one call.
            StatusCode::OK if offset == 0 => {}
            StatusCode::RANGE_NOT_SATISFIABLE => return Ok(Bytes::new()),
            StatusCode::NOT_FOUND => {
                return Err(ChunkClientError::ObjectNotFound {
                    location: location.to_string(),
                });
            }
            _ => {
                return Err(ChunkClientError::Transport {
                    reason: format!("upstream answered {status} for offset {offset}"),
                });
            }
        }

        if let Some(length) = response.content_length().filter(|&length| length > limit) {
            return Err(oversized(offset, limit, length));
        }

        // Never buffer more than `limit` bytes, even when the upstream streams
        // an unbounded body.
        let mut body = BytesMut::with_capacity(usize::try_from(limit).unwrap_or_default());
        while let Some(frame) = response
            .chunk()
            .await
            .map_err(|e| map_transport_error(e, offset))?
        {
            let received = (body.len() + frame.len()) as u64;
            if received > limit {
                tracing::debug!(%location, offset, limit, received, "Upstream overran the request");
                return Err(oversized(offset, limit, received));
            }
            body.extend_from_slice(&frame);
        }

        Ok(body.freeze())
    }
}
