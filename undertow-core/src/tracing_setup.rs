//! Process-wide tracing initialization
//!
//! Console output follows the level the operator asked for; a second layer
//! records trace detail for every run into a log file that is overwritten on
//! each start. Call `init_tracing` once from `main` before building services.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File that receives the full trace log of the current run.
pub const RUN_LOG_FILE: &str = "undertow-last-run.log";

/// Dependencies that are far too chatty at trace level.
const QUIET_TARGETS: &str = "hyper=info,hyper_util=info,reqwest=info,h2=info,tower_http=debug";

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("cannot prepare log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the console and run-log layers.
///
/// `RUST_LOG` overrides `console_level` for the console layer only. Returns
/// the path of the run log.
///
/// # Errors
/// - `TracingError::LogFile` - Logs directory or file cannot be created
/// - `TracingError::AlreadyInstalled` - A global subscriber is already set
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, TracingError> {
    let logs_dir = logs_dir.unwrap_or_else(|| Path::new("logs"));
    let log_path = logs_dir.join(RUN_LOG_FILE);

    let log_file = create_dir_all(logs_dir)
        .and_then(|()| File::create(&log_path))
        .map_err(|source| TracingError::LogFile {
            path: log_path.clone(),
            source,
        })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{console_level},{QUIET_TARGETS}")));

    let console_layer = fmt::layer()
        .with_target(true)
        .compact()
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(run_log_filter());

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        console = %console_level,
        run_log = %log_path.display(),
        "Tracing initialized"
    );

    Ok(log_path)
}

/// Filter for the run log: everything, minus the noisy dependencies.
fn run_log_filter() -> EnvFilter {
    EnvFilter::new(format!("trace,{QUIET_TARGETS}"))
}

/// Log verbosity selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    #[default]
    Info,
    /// Everything except per-chunk tracing
    Debug,
    /// All messages including per-chunk tracing
    Trace,
}

impl CliLogLevel {
    /// Converts the CLI level to the matching `tracing::Level`.
    ///
    /// # Examples
    /// ```
    /// use undertow_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Warn.as_tracing_level(), tracing::Level::WARN);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}
