//! Centralized configuration for Undertow.
//!
//! All tunable parameters are defined here and injected into components at
//! construction time. Nothing reads configuration from global state.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Undertow components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub store: StoreConfig,
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
    pub inspection: InspectionConfig,
}

/// Remote chunk store protocol limits.
///
/// The store only accepts requests whose offset is a multiple of `alignment`
/// and whose length does not exceed `max_request_size`. Range streaming reads
/// ahead one `chunk_size` chunk at a time.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Required multiple for every request offset
    pub alignment: u64,
    /// Read-ahead chunk granularity used by range streaming
    pub chunk_size: u64,
    /// Absolute per-call ceiling enforced by the store
    pub max_request_size: u64,
    /// Timeout applied to every remote call
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            alignment: 4096,                // 4 KiB
            chunk_size: 512 * 1024,         // 512 KiB
            max_request_size: 1024 * 1024,  // 1 MiB
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Upstream HTTP chunk endpoint configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL that object locations are resolved against
    pub base_url: String,
    /// User agent for upstream requests
    pub user_agent: &'static str,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000/objects/".to_string(),
            user_agent: "undertow/0.1.0",
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JSON manifest describing the objects the server may expose
    pub catalog_path: Option<PathBuf>,
    /// Number of hex characters in a stream link hash
    pub link_hash_length: usize,
    /// Size of each body frame handed to the HTTP writer
    pub stream_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            catalog_path: None,
            link_hash_length: 6,
            stream_buffer_size: 65536, // 64 KiB
        }
    }
}

/// Content inspection configuration.
#[derive(Debug, Clone)]
pub struct InspectionConfig {
    /// Total bytes drawn from around the middle of an object
    pub target_bytes: u64,
    /// Timestamp of the preferred still frame
    pub preferred_timestamp: String,
    /// Frame extraction binary
    pub ffmpeg_path: PathBuf,
    /// Upper bound for a single extraction attempt
    pub extraction_timeout: Duration,
    /// Directory for per-sample scratch space (system temp dir when unset)
    pub temp_root: Option<PathBuf>,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            target_bytes: 8 * 1024 * 1024, // 8 MiB
            preferred_timestamp: "00:00:02".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            extraction_timeout: Duration::from_secs(30),
            temp_root: None,
        }
    }
}

/// Errors raised by configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("chunk size {chunk_size} is not a multiple of alignment {alignment}")]
    UnalignedChunkSize { chunk_size: u64, alignment: u64 },

    #[error("chunk size {chunk_size} exceeds the per-request maximum {max_request_size}")]
    ChunkExceedsRequestLimit {
        chunk_size: u64,
        max_request_size: u64,
    },

    #[error("invalid upstream base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("cannot build upstream HTTP client: {reason}")]
    HttpClient { reason: String },
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(alignment) = env_parse::<u64>("UNDERTOW_STORE_ALIGNMENT") {
            config.store.alignment = alignment;
        }
        if let Some(chunk_size) = env_parse::<u64>("UNDERTOW_CHUNK_SIZE") {
            config.store.chunk_size = chunk_size;
        }
        if let Some(max_request) = env_parse::<u64>("UNDERTOW_MAX_REQUEST_SIZE") {
            config.store.max_request_size = max_request;
        }
        if let Some(seconds) = env_parse::<u64>("UNDERTOW_REQUEST_TIMEOUT") {
            config.store.request_timeout = Duration::from_secs(seconds);
        }

        if let Ok(base_url) = std::env::var("UNDERTOW_UPSTREAM_URL") {
            config.upstream.base_url = base_url;
        }

        if let Ok(host) = std::env::var("UNDERTOW_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("UNDERTOW_PORT") {
            config.server.port = port;
        }
        if let Ok(path) = std::env::var("UNDERTOW_CATALOG") {
            config.server.catalog_path = Some(PathBuf::from(path));
        }

        if let Some(target) = env_parse::<u64>("UNDERTOW_SAMPLE_BYTES") {
            config.inspection.target_bytes = target;
        }
        if let Ok(path) = std::env::var("UNDERTOW_FFMPEG") {
            config.inspection.ffmpeg_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("UNDERTOW_TEMP_DIR") {
            config.inspection.temp_root = Some(PathBuf::from(path));
        }

        config
    }

    /// Checks the store limits and upstream URL for consistency.
    ///
    /// # Errors
    /// - `ConfigError::Zero` - A size limit is zero
    /// - `ConfigError::UnalignedChunkSize` - Chunk size breaks alignment
    /// - `ConfigError::ChunkExceedsRequestLimit` - Chunk larger than one call
    /// - `ConfigError::InvalidBaseUrl` - Upstream URL does not parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        let store = &self.store;
        for (field, value) in [
            ("store.alignment", store.alignment),
            ("store.chunk_size", store.chunk_size),
            ("store.max_request_size", store.max_request_size),
            ("inspection.target_bytes", self.inspection.target_bytes),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.server.stream_buffer_size == 0 {
            return Err(ConfigError::Zero {
                field: "server.stream_buffer_size",
            });
        }

        if store.chunk_size % store.alignment != 0 {
            return Err(ConfigError::UnalignedChunkSize {
                chunk_size: store.chunk_size,
                alignment: store.alignment,
            });
        }
        if store.chunk_size > store.max_request_size {
            return Err(ConfigError::ChunkExceedsRequestLimit {
                chunk_size: store.chunk_size,
                max_request_size: store.max_request_size,
            });
        }

        url::Url::parse(&self.upstream.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.upstream.base_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Creates a configuration with small limits suited to fast tests.
    pub fn for_testing() -> Self {
        Self {
            store: StoreConfig {
                alignment: 16,
                chunk_size: 64,
                max_request_size: 128,
                request_timeout: Duration::from_secs(5),
            },
            inspection: InspectionConfig {
                target_bytes: 1024,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
