//! pulse-engine - retail-sentiment resilience layer and signal-fusion service
//!
//! Serves the resilient quote proxy, health, snapshot reads and the admin
//! backfill/run endpoints, and drives scheduled snapshot runs in-process.

use anyhow::{Context, Result};
use clap::Parser;
use pulse_common::config::{load_toml_config, RootFolderInitializer, RootFolderResolver};
use pulse_common::{Clock, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pulse_engine::config::EngineConfig;
use pulse_engine::services::Scheduler;
use pulse_engine::AppState;

#[derive(Debug, Parser)]
#[command(name = "pulse-engine", version, about = "Retail-sentiment signal engine")]
struct Args {
    /// Root folder holding pulse.toml and pulse.db
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Override the bind address
    #[arg(long)]
    bind: Option<String>,

    /// Serve HTTP only; do not start the scheduler
    #[arg(long)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: Resolve root folder and read pulse.toml (before logging, for the level)
    let root_folder = RootFolderResolver::new("pulse-engine")
        .with_cli_arg(args.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    let toml_config = load_toml_config(&initializer.config_path())?;

    // Step 2: Initialize tracing; RUST_LOG wins over the TOML level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting pulse-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Step 3: Resolve engine settings
    let mut config = EngineConfig::from_environment(&toml_config)?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if args.no_scheduler {
        config.scheduler_enabled = false;
    }

    // Step 4: Open or create database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = pulse_engine::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Step 5: Collaborators and application state
    let collaborators = pulse_engine::http_collaborators(&config)
        .map_err(|e| anyhow::anyhow!("Failed to build collaborator clients: {}", e))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bind_address = config.bind_address.clone();
    let scheduler_enabled = config.scheduler_enabled;
    let state = AppState::new(db_pool.clone(), config, collaborators, clock.clone());

    if scheduler_enabled {
        Scheduler::new(
            state.orchestrator.clone(),
            db_pool,
            state.quote_cache().clone(),
            clock,
        )
        .spawn();
    } else {
        info!("Scheduler disabled");
    }

    // Step 6: Serve
    let app = pulse_engine::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
