//! CORS middleware configuration.

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Create a CORS layer from configuration.
///
/// An empty list (or one where nothing parses) allows any origin.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::OPTIONS];

    let parsed_origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    if parsed_origins.is_empty() {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(Any)
            .allow_origin(Any)
    } else {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([CONTENT_TYPE, ACCEPT])
            .allow_origin(parsed_origins)
    }
}
