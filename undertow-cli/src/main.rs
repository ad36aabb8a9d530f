//! Undertow CLI - Command-line interface
//!
//! Runs the streaming server and exposes one-shot inspection and link hash
//! lookups for operators.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use undertow_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "undertow")]
#[command(about = "Range streaming server for chunked remote stores")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the per-run trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref()) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match commands::handle_command(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {e:?}");
            let (message, code) = commands::describe_failure(&e);
            eprintln!("Error: {message}");
            ExitCode::from(code)
        }
    }
}
