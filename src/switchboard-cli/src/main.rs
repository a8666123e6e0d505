//! Switchboard CLI entry point.

mod args;
mod commands;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use switchboard_engine::{EngineConfig, FleetConfig, ToolServerRegistry};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::args::Cli;

/// Environment variable consulted for a log filter before `RUST_LOG`.
const LOG_ENV: &str = "SWITCHBOARD_LOG";

fn init_tracing(cli: &Cli) {
    let filter = match cli.requested_level() {
        Some(level) => EnvFilter::new(level.as_filter_str()),
        None => EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    // Logs go to stderr; stdout carries only replies.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(&cli);

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let fleet = FleetConfig::load(&cli.servers)
        .with_context(|| format!("Failed to load {}", cli.servers.display()))?;

    let registry = Arc::new(ToolServerRegistry::with_processes(&config.timeouts));

    let result = tokio::select! {
        result = commands::run(&cli, &config, &fleet, registry.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            Ok(())
        }
    };

    let report = registry.shutdown().await;
    debug!(?report, "Tool servers shut down");

    result
}
