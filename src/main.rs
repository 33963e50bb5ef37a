// ABOUTME: Main entry point for the fanout CLI
// ABOUTME: Loads .env, initializes logging, and runs the requested command

use anyhow::Result;
use clap::Parser;
use fanout::cli::{self, Cli};
use fanout::telemetry;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init_logging(cli.log_format);
    tracing::debug!(command = ?cli.command, "Starting fanout");

    cli::run(cli).await
}
