//! HTTP server for Undertow
//!
//! Serves catalog objects as seekable byte streams and exposes a small JSON
//! API for link hashes and background content inspection.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use undertow_core::config::UndertowConfig;
#[cfg(feature = "simulation")]
use undertow_core::sampling::StubClassifier;
use undertow_core::sampling::ContentInspector;
use undertow_core::store::HttpChunkClient;
use undertow_core::{ConfigError, RemoteChunkClient, RuntimeMode, StoreLimits};
#[cfg(feature = "simulation")]
use undertow_sim::{SimulatedFrameExtractor, demo_store};

use crate::catalog::{CatalogError, ObjectCatalog};
use crate::handlers::{inspect_object, object_hash, ping, server_status, stream_object};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ObjectCatalog>,
    pub client: Arc<dyn RemoteChunkClient>,
    pub limits: StoreLimits,
    pub inspector: Arc<ContentInspector<dyn RemoteChunkClient>>,
    pub link_hash_length: usize,
    pub stream_buffer_size: usize,
    /// Cancelled on shutdown; every open stream holds a child token.
    pub shutdown: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Assembles state around an arbitrary chunk client.
    pub fn new(
        config: &UndertowConfig,
        catalog: ObjectCatalog,
        client: Arc<dyn RemoteChunkClient>,
        inspector: ContentInspector<dyn RemoteChunkClient>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            client,
            limits: StoreLimits::from(&config.store),
            inspector: Arc::new(inspector),
            link_hash_length: config.server.link_hash_length,
            stream_buffer_size: config.server.stream_buffer_size,
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    /// State backed by the configured upstream store and catalog manifest.
    ///
    /// # Errors
    /// - `ServerError::Config` - Invalid configuration or upstream URL
    /// - `ServerError::Catalog` - Catalog manifest cannot be loaded
    pub async fn production(config: &UndertowConfig) -> Result<Self, ServerError> {
        let catalog = match &config.server.catalog_path {
            Some(path) => ObjectCatalog::load(path).await?,
            None => {
                tracing::warn!("No catalog configured, serving no objects");
                ObjectCatalog::new()
            }
        };

        let client: Arc<dyn RemoteChunkClient> =
            Arc::new(HttpChunkClient::new(&config.upstream, &config.store)?);
        let limits = StoreLimits::from(&config.store);
        let inspector =
            ContentInspector::from_config(Arc::clone(&client), limits, &config.inspection);

        Ok(Self::new(config, catalog, client, inspector))
    }

    /// State for the requested runtime mode.
    ///
    /// # Errors
    /// - `ServerError::Config` - Invalid configuration or upstream URL
    /// - `ServerError::Catalog` - Catalog manifest cannot be loaded
    /// - `ServerError::DemoUnavailable` - Demo mode without the `simulation` feature
    pub async fn for_mode(config: &UndertowConfig, mode: RuntimeMode) -> Result<Self, ServerError> {
        match mode {
            RuntimeMode::Production => Self::production(config).await,
            #[cfg(feature = "simulation")]
            RuntimeMode::Demo => Ok(Self::demo(config)),
            #[cfg(not(feature = "simulation"))]
            RuntimeMode::Demo => Err(ServerError::DemoUnavailable),
        }
    }

    /// State backed by the in-memory demo store and a simulated extractor.
    #[cfg(feature = "simulation")]
    pub fn demo(config: &UndertowConfig) -> Self {
        let limits = StoreLimits::from(&config.store);
        let (store, objects) = demo_store(limits);
        let catalog: ObjectCatalog = objects
            .into_iter()
            .map(|object| (object.id, object.handle))
            .collect();

        let client: Arc<dyn RemoteChunkClient> = store;
        let inspector = ContentInspector::new(
            Arc::clone(&client),
            limits,
            Arc::new(SimulatedFrameExtractor::new()),
            Arc::new(StubClassifier),
            &config.inspection,
        );

        Self::new(config, catalog, client, inspector)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("demo mode requires the simulation feature")]
    DemoUnavailable,

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/stream/{id}/{hash}", get(stream_object))
        .route("/api/v1/status", get(server_status))
        .route("/api/v1/hash/{id}", get(object_hash))
        .route("/api/v1/inspect/{id}", post(inspect_object))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the server until Ctrl-C.
///
/// # Errors
/// - `ServerError::Config` - Configuration failed validation
/// - `ServerError::Catalog` - Catalog could not be loaded
/// - `ServerError::DemoUnavailable` - Demo mode without the `simulation` feature
/// - `ServerError::Bind` - Listen address unavailable
/// - `ServerError::Serve` - Server loop failed
pub async fn run_server(config: UndertowConfig, mode: RuntimeMode) -> Result<(), ServerError> {
    config.validate()?;

    let state = AppState::for_mode(&config, mode).await?;
    let shutdown = state.shutdown.clone();

    if mode.is_demo() {
        for id in state.catalog.ids() {
            if let Some(object) = state.catalog.get(id) {
                tracing::info!(
                    "Demo object {}: /stream/{}/{} ({} bytes)",
                    object.name(),
                    id,
                    object.link_hash(state.link_hash_length),
                    object.size()
                );
            }
        }
    }

    let app = build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!("Undertow ({mode}) listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(ServerError::Serve)?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    tracing::info!("Shutdown requested, closing open streams");
    shutdown.cancel();
}
