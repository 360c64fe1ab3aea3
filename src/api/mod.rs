//! HTTP API — Axum server exposing odds, edges and bet tracking.
//!
//! CORS is open to any origin for GET and POST.

pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub use error::ApiError;
pub use routes::{ApiState, AppState};

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/sports", get(routes::get_sports))
        .route("/bookmakers", get(routes::get_bookmakers))
        .route("/bets", get(routes::get_bets))
        .route("/health", get(routes::health))
        .route("/settings", get(routes::get_settings).post(routes::put_settings))
        .route("/tracked", get(routes::get_tracked).post(routes::post_tracked))
        .route("/register", axum::routing::post(routes::post_register))
        .route("/history", get(routes::get_history))
        .route("/stats", get(routes::get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `addr` until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API address {addr}"))?;
    info!(%addr, "API server listening on http://{addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
