//! Read-only HTTP API.
//!
//! Axum server exposing the per-agent trade feed and the cross-agent
//! summary to the frontend. Strictly read-only: handlers serve the
//! persisted store and the scheduler's published snapshots; the engine
//! never executes in response to a request. CORS is open for local
//! development.

pub mod routes;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::ApiState;

/// Start the API server as a background task; does not block.
pub fn spawn_api(state: ApiState, port: u16) {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "Read API listening on http://localhost:{port}");

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "Read API server error");
                }
            }
            Err(e) => tracing::error!(error = %e, port, "Failed to bind read API port"),
        }
    });
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/agents/summary", get(routes::get_summary))
        .route("/api/agents/:agent_id/trades", get(routes::get_agent_trades))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
