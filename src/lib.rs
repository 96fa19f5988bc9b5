// ==============================================================================
// lib.rs - Augmentation Gateway Library
// ==============================================================================
// Description: Upload gateway that validates a ZIP and parameters, drives the
//              processing service through params -> upload -> augment, and
//              streams the augmented archive back to the client
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod config;
pub mod downstream;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod relay;
pub mod state;
pub mod validator;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub use config::Config;
pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config().body_limit();

    // API routes
    let api_routes = Router::new()
        // Upload + augmentation (streams the result back)
        .route(
            "/process",
            post(handlers::process_upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        // Health checks
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check));

    let allowed_origins: Vec<HeaderValue> = state
        .config()
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_credentials(false)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        // Browser needs the filename of the downloaded archive
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(handlers::root))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                // Request tracing
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
