//! HTTP server: Axum router for the trading agent API.
//!
//! CORS is permissive so the browser front end can call it from any
//! origin.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use routes::{AppState, ServerState};

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(routes::root))
        .route("/set_swap", post(routes::set_swap))
        .route("/check-balances", post(routes::check_balances))
        .route("/fetch_pair", post(routes::fetch_pair))
        .route("/api/wallet/fetch_pair", post(routes::fetch_pair))
        .route("/swap", post(routes::swap))
        .route("/deploy", post(routes::deploy))
        .route("/stop_execution", post(routes::stop_execution))
        .route("/fetch_logs", post(routes::fetch_logs))
        .route("/api/telegram/configure", post(routes::telegram_configure))
        .route("/api/telegram/status", get(routes::telegram_status))
        .route("/api/telegram/test", post(routes::telegram_test))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "Server running on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
