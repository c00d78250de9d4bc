//! Flux Progress - progress tracking service for the reader frontend
//!
//! The sync driver and the download engine report into this service; the
//! reader UI reads derived views over HTTP or the WebSocket change feed.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flux_progress::config;
use flux_progress::db::Database;
use flux_progress::{server, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = config::load_or_create_default()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting Flux Progress v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {:?}", config::config_path());

    // Initialize database
    let db = Database::new()?;
    info!("Database initialized");

    // Create shared application state
    let state = Arc::new(AppState::new(settings, Some(db)));

    server::run(state).await
}
