//! # pagepulse CLI
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pagepulse serve` | Refresh all groups, then serve the query API, refreshing on a timer |
//! | `pagepulse refresh` | Run one refresh cycle and exit |
//!
//! Both commands accept `--config <path>` pointing to a TOML file; without it
//! the built-in defaults are used (stock `lighthouse` and `visual` groups,
//! sources resolved from `storage.base_url` or `PAGEPULSE_<GROUP>_SOURCES`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use pagepulse::config::{load_config, Config};
use pagepulse::live::LiveHandles;
use pagepulse::scheduler::Refresher;
use pagepulse::server::{run_server, AppState};

/// pagepulse — merge remote SQLite scan databases and serve them over HTTP.
#[derive(Parser)]
#[command(
    name = "pagepulse",
    about = "Downloads remote SQLite scan databases, merges them, and serves the result over a read-only JSON API",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh all groups, then serve the query API with periodic refresh.
    Serve,
    /// Run one refresh cycle for all groups, print the outcome, and exit.
    ///
    /// Exits non-zero if every group failed.
    Refresh,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let config = Arc::new(config);

    let handles = Arc::new(LiveHandles::new());
    let refresher = Arc::new(Refresher::new(config.clone(), handles.clone()));

    match cli.command {
        Commands::Serve => {
            refresher.refresh_all().await;
            tokio::spawn(refresher.clone().run_interval_loop());

            run_server(AppState {
                config,
                handles,
                refresher,
            })
            .await
        }
        Commands::Refresh => {
            let outcome = refresher.refresh_all().await;
            for (group, ok) in &outcome.groups {
                println!("  {}: {}", group, if *ok { "ok" } else { "failed" });
            }
            handles.shutdown().await;

            if outcome.groups.values().any(|ok| *ok) {
                Ok(())
            } else {
                anyhow::bail!("all groups failed to refresh")
            }
        }
    }
}
