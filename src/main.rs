//! Project RED API Server
//!
//! Run with: cargo run --bin project-red -- --config config.toml
//!
//! # Configuration
//!
//! Settings come from the TOML file given with `--config`, otherwise from
//! the default locations (see [`Config::load_default`]). Environment
//! variables with the `PROJECT_RED_` prefix override either, and
//! `RUST_LOG` overrides the configured log level.

use anyhow::Context;
use clap::Parser;
use project_red::api::{serve, AppState};
use project_red::config::Config;
use project_red::logging;
use project_red::storage::Database;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "project-red")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Blood donation coordination API server")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load_from(args.config.as_deref()).context("Failed to load config")?;

    logging::init(&config.logging);
    tracing::info!("Starting Project RED API server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config.database.path, "Opening database");

    let db = Arc::new(
        Database::open(&config.database.path)
            .with_context(|| format!("Failed to open database {}", config.database.path))?,
    );

    let state = AppState::from_config(config, db).context("Failed to build services")?;
    serve(state).await?;

    tracing::info!("Project RED API server stopped");
    Ok(())
}
