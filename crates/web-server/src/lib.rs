//! # Arena Web Server
//!
//! Transports for the command surface: JSON over HTTP, plus the `handle_raw`
//! entry point the binary uses for JSON over stdio.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod commands;
pub mod error;
pub mod handlers;
pub mod state;

pub use commands::{ACTIONS, CommandRequest, dispatch, execute, handle_raw};
pub use error::AppError;
pub use state::{AppState, StoreLocations, bootstrap};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/command", post(handlers::command))
        .route("/api/system", get(handlers::system_info))
        .route("/api/competitions", get(handlers::list_competitions))
        .route("/api/competitions/:competition_id", get(handlers::get_competition))
        .route(
            "/api/competitions/:competition_id/leaderboard",
            get(handlers::get_leaderboard),
        )
        .route(
            "/api/competitions/:competition_id/decisions",
            get(handlers::get_decisions),
        )
        .route(
            "/api/competitions/:competition_id/snapshots",
            get(handlers::get_snapshots),
        )
        .with_state(Arc::new(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
}

/// Serves the router until the process is stopped. Tracing must already be initialized.
pub async fn run_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Web server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
