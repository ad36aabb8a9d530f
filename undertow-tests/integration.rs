//! Integration tests for Undertow
//!
//! Exercise the streaming server, the inspection pipeline and the HTTP
//! chunk client end to end against the simulated store or a local fake
//! upstream.

#[path = "integration/catalog_manifest.rs"]
mod catalog_manifest;
#[path = "integration/http_upstream.rs"]
mod http_upstream;
#[path = "integration/sampling_pipeline.rs"]
mod sampling_pipeline;
#[path = "integration/streaming_http.rs"]
mod streaming_http;
