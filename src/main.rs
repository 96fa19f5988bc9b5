// ==============================================================================
// main.rs - Augmentation Gateway Entry Point
// ==============================================================================
// Description: Axum web server in front of the augmentation processing service
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use augment_gateway::{build_router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    info!("Starting Augmentation Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Processing server: {} (API key {})",
        config.processing_url,
        if config.processing_api_key.is_some() { "set" } else { "not set" }
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // Initialize application state
    let state = AppState::new(config).context("Failed to initialize application state")?;

    // Build router with all endpoints
    let app = build_router(state);

    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
