//! CLI command implementations

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use undertow_core::config::UndertowConfig;
use undertow_core::{RuntimeMode, UndertowError};
use undertow_web::{AppState, ObjectCatalog, run_server};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Server {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Object catalog manifest
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        /// Serve generated objects from the in-memory store
        #[arg(long)]
        demo: bool,
    },
    /// Sample one object and run the inspection pipeline on it
    Inspect {
        /// Object id from the catalog
        id: String,
        /// Object catalog manifest
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        /// Inspect a demo object instead of a remote one
        #[arg(long)]
        demo: bool,
    },
    /// Print the stream link for an object
    Hash {
        /// Object id from the catalog
        id: String,
        /// Object catalog manifest
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the failure of whichever command ran
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    let mut config = UndertowConfig::from_env();

    match command {
        Commands::Server {
            host,
            port,
            catalog,
            demo,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if catalog.is_some() {
                config.server.catalog_path = catalog;
            }
            start_server(config, mode_for(demo)).await
        }
        Commands::Inspect { id, catalog, demo } => {
            if catalog.is_some() {
                config.server.catalog_path = catalog;
            }
            inspect(config, id, mode_for(demo)).await
        }
        Commands::Hash { id, catalog } => {
            let path = catalog
                .or(config.server.catalog_path.clone())
                .context("no catalog given; pass --catalog or set UNDERTOW_CATALOG")?;
            print_hash(&config, &id, path).await
        }
    }
}

fn mode_for(demo: bool) -> RuntimeMode {
    if demo {
        RuntimeMode::Demo
    } else {
        RuntimeMode::Production
    }
}

/// Message and exit code for a failed command.
///
/// Core errors are shown through their user-facing message; bad input exits
/// with 2, everything else with 1.
pub fn describe_failure(error: &anyhow::Error) -> (String, u8) {
    match error.downcast_ref::<UndertowError>() {
        Some(core) if core.is_user_error() => (core.user_message(), 2),
        Some(core) => (core.user_message(), 1),
        None => (format!("{error:#}"), 1),
    }
}

async fn start_server(config: UndertowConfig, mode: RuntimeMode) -> anyhow::Result<()> {
    run_server(config, mode).await.context("server failed")
}

async fn inspect(config: UndertowConfig, id: String, mode: RuntimeMode) -> anyhow::Result<()> {
    config.validate().map_err(UndertowError::from)?;
    let state = AppState::for_mode(&config, mode).await?;

    let object = state
        .catalog
        .get(&id)
        .ok_or_else(|| UndertowError::ObjectNotFound { id: id.clone() })?;

    println!("Inspecting {} ({} bytes)", object.name(), object.size());
    match state.inspector.try_inspect(object).await {
        Ok(report) => {
            println!(
                "  sample: {} bytes at offset {}",
                report.sample_bytes, report.sample_start
            );
            println!("  frame:  {} bytes ({:?})", report.frame_bytes, report.frame_source);
            println!("  flagged: {}", report.flagged);
            Ok(())
        }
        Err(e) => {
            tracing::error!(%id, "Inspection failed: {e}");
            Err(UndertowError::from(e).into())
        }
    }
}

async fn print_hash(config: &UndertowConfig, id: &str, catalog: PathBuf) -> anyhow::Result<()> {
    let catalog = ObjectCatalog::load(&catalog).await?;
    let object = catalog.get(id).ok_or_else(|| UndertowError::ObjectNotFound {
        id: id.to_string(),
    })?;

    let hash = object.link_hash(config.server.link_hash_length);
    println!("{hash}");
    println!(
        "http://{}:{}/stream/{}/{}",
        config.server.host, config.server.port, id, hash
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use undertow_core::{ChunkClientError, ConfigError};

    use super::*;

    #[test]
    fn test_missing_object_is_a_user_error() {
        let error = anyhow::Error::from(UndertowError::ObjectNotFound {
            id: "42".to_string(),
        });
        assert_eq!(describe_failure(&error), ("File 42 not found".to_string(), 2));
    }

    #[test]
    fn test_store_failure_hides_transport_detail() {
        let error = anyhow::Error::from(UndertowError::from(ChunkClientError::Transport {
            reason: "connection reset by 10.0.0.7".to_string(),
        }));
        let (message, code) = describe_failure(&error);
        assert_eq!(message, "Remote store error occurred");
        assert_eq!(code, 1);
    }

    #[test]
    fn test_invalid_config_is_a_user_error() {
        let error = anyhow::Error::from(UndertowError::from(ConfigError::HttpClient {
            reason: "no TLS backend".to_string(),
        }));
        let (message, code) = describe_failure(&error);
        assert!(message.starts_with("Invalid configuration"));
        assert_eq!(code, 2);
    }

    #[test]
    fn test_other_errors_keep_their_context() {
        let error = anyhow::anyhow!("socket closed").context("server failed");
        assert_eq!(describe_failure(&error), ("server failed: socket closed".to_string(), 1));
    }
}
