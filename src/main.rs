mod commands;
mod config;
mod render;
mod scheduler;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::AppConfig;

const DEFAULT_LOG_FILTER: &str = "info,tasksync=debug,tasksync_core=debug";

#[derive(Parser)]
#[command(name = "tasksync")]
#[command(about = "Keep a spreadsheet of calendar events in sync with a calendar feed")]
struct Cli {
    /// Config file (defaults to ~/.config/tasksync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync now, then on every scheduled tick until interrupted
    Run,
    /// Sync once and exit
    Sync,
    /// Show what the next sync would change, without writing
    Status {
        /// List every event instead of counts, and show unchanged ones
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded environment from {}", path.display());
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => commands::run::run(config).await,
        Commands::Sync => commands::sync::run(config).await,
        Commands::Status { verbose } => commands::status::run(config, verbose).await,
    }
}
