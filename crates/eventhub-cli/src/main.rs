//! EventHub CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use eventhub_core::error::{AppError, ErrorKind};

mod commands;
mod output;

use commands::Cli;

/// Exit status for a failed command, so scripts can tell a full product
/// or a stale slot ID apart from an outage.
fn exit_code(error: &AppError) -> ExitCode {
    match error.kind {
        ErrorKind::NotFound => ExitCode::from(3),
        ErrorKind::CapacityExceeded | ErrorKind::Conflict => ExitCode::from(4),
        ErrorKind::Validation | ErrorKind::Configuration => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Diagnostics go to stderr; stdout carries command output only.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match Cli::parse().execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&e.to_string());
            exit_code(&e)
        }
    }
}
