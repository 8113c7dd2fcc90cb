//! Manuel CLI - ask questions about your product manuals from the terminal.
//!
//! Thin front end over `manuel-core`: parses arguments, wires the session and
//! API client, renders results and maps failures to exit codes.

mod app;
mod cli;
mod commands;
mod output;

use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use manuel_core::config::{Config, OutputFormat};

use cli::{Cli, Command};
use output::Output;

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG wins when set. Otherwise only warnings are shown, or debug output
/// from our own crates with `--verbose`. The returned guard flushes the log
/// file and must live until exit.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("manuel_cli={level},manuel_core={level},warn")));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path {}", path.display()))?;
            std::fs::create_dir_all(directory)
                .with_context(|| format!("Could not create {}", directory.display()))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let _guard = match init_tracing(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(output::EXIT_SYSTEM);
        }
    };
    info!(version = env!("CARGO_PKG_VERSION"), "manuel starting");

    let config = Config::load();
    let json = cli.json || matches!(&config, Ok(c) if c.output == OutputFormat::Json);
    let out = Output::new(json);

    let result = match (cli.command, config) {
        // Config commands must work even when the current config is broken
        (Command::Config(command), _) => commands::config::run(command, out),
        (command, Ok(config)) => commands::run(command, config, out).await,
        (_, Err(e)) => Err(e.into()),
    };

    if let Err(ref e) = result {
        debug!(error = ?e, "Command failed");
        out.error(e);
    }
    output::exit_status(&result)
}
