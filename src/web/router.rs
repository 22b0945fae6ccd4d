//! Router configuration.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::WebConfig;

use super::handlers::{health_check, stats};
use super::middleware::create_cors_layer;
use super::state::AppState;
use super::ws::stomp_ws_handler;

/// Create the main router: the STOMP endpoint and the stats API.
pub fn create_router(state: Arc<AppState>, web: &WebConfig) -> Router {
    let endpoint = state.relay.endpoint.clone();
    let sockjs_endpoint = format!("{}/websocket", endpoint.trim_end_matches('/'));

    let api_routes = Router::new().route("/stats", get(stats));

    Router::new()
        .route(&endpoint, get(stomp_ws_handler))
        .route(&sockjs_endpoint, get(stomp_ws_handler))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&web.cors_origins)),
        )
        .with_state(state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}
