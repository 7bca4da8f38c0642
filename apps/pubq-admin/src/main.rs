use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use pubq_node::Broker;
use pubq_store::MemoryStore;
use std::path::PathBuf;
use tracing::{debug, info};

mod commands;
mod config;

use commands::{execute, CommandContext, Commands};
use config::AdminConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Overrides the configured state snapshot path
    #[arg(long)]
    state: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let filter = std::env::var("PUBQ_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = AdminConfig::new(cli.config.clone()).context("failed to load configuration")?;
    let state_path = cli.state.clone().unwrap_or_else(|| cfg.state_path.clone());

    let store = MemoryStore::load_or_default(&state_path)
        .with_context(|| format!("failed to load state from {}", state_path.display()))?;
    debug!(path = %state_path.display(), keys = store.key_count(), "loaded broker state");

    let broker = Broker::new(store, cfg.broker_config());
    let ctx = CommandContext {
        now: Utc::now(),
        lease_timeout: cfg.lease_timeout,
        default_ttl: cfg.default_ttl,
    };
    for line in execute(&broker, &cli.command, &ctx)? {
        println!("{line}");
    }

    if cli.command.mutates() {
        broker
            .store()
            .snapshot_to_path(&state_path)
            .with_context(|| format!("failed to save state to {}", state_path.display()))?;
        info!(path = %state_path.display(), "saved broker state");
    }
    Ok(())
}
