//! HTTP surface tests.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use canvas_relay::relay::{Connection, ConnectionId};
use canvas_relay::web::{create_health_router, create_router, AppState};
use canvas_relay::Config;
use serde_json::Value;

/// Create a test server and keep a handle on its state.
fn create_test_server() -> (TestServer, Arc<AppState>) {
    let config = Config::default();
    let state = Arc::new(AppState::new(&config));
    let router = create_router(Arc::clone(&state), &config.web).merge(create_health_router());
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, state)
}

#[tokio::test]
async fn test_health() {
    let (server, _) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    response.assert_text("OK");
}

#[tokio::test]
async fn test_stats_empty() {
    let (server, _) = create_test_server();

    let response = server.get("/api/stats").await;

    response.assert_status_ok();
    let json = response.json::<Value>();
    assert_eq!(json["connections"], 0);
    assert_eq!(json["sessions"], 0);
    assert_eq!(json["topics"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_stats_lists_topics() {
    let (server, state) = create_test_server();
    for topic in ["/topic/board", "/topic/board", "/topic/alt"] {
        let (connection, _rx) = Connection::channel(ConnectionId::new(), 4);
        state.manager.register(connection, topic).await.unwrap();
    }

    let json = server.get("/api/stats").await.json::<Value>();

    assert_eq!(json["connections"], 3);
    let topics = json["topics"].as_array().unwrap();
    assert_eq!(topics.len(), 2);
    assert_eq!(topics[0]["name"], "/topic/alt");
    assert_eq!(topics[0]["subscribers"], 1);
    assert_eq!(topics[1]["name"], "/topic/board");
    assert_eq!(topics[1]["subscribers"], 2);
    assert!(topics[1]["created_at"].is_string());
}

#[tokio::test]
async fn test_plain_get_on_endpoint_is_bad_request() {
    let (server, _) = create_test_server();

    let response = server.get("/canvaWs").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json = response.json::<Value>();
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("protocol upgrade failed"));
}

#[tokio::test]
async fn test_cors_preflight_allowed() {
    let (server, _) = create_test_server();

    let response = server
        .method(axum::http::Method::OPTIONS, "/api/stats")
        .add_header(
            axum::http::header::ORIGIN,
            axum::http::HeaderValue::from_static("http://localhost:5173"),
        )
        .add_header(
            axum::http::header::ACCESS_CONTROL_REQUEST_METHOD,
            axum::http::HeaderValue::from_static("GET"),
        )
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "*"
    );
}
