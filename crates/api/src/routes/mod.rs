//! API routes

pub mod health;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn build_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // WebSocket routes (auth handled in handler via query parameter)
    let websocket_routes = Router::new().route("/ws/chat", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", websocket_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
