//! Undertow Web - Range streaming HTTP server
//!
//! Exposes catalog objects as seekable HTTP streams backed by the remote
//! chunk store, plus a small JSON API.

pub mod catalog;
pub mod handlers;
pub mod server;

// Re-export main types
pub use catalog::{CatalogError, ObjectCatalog};
pub use server::{AppState, ServerError, build_router, run_server};
