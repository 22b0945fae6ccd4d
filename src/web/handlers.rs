//! HTTP handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use super::state::AppState;

/// One topic in the stats response.
#[derive(Debug, Serialize)]
pub struct TopicStats {
    /// Topic name.
    pub name: String,
    /// Registered subscribers.
    pub subscribers: usize,
    /// RFC 3339 timestamp of the first subscription.
    pub created_at: String,
}

/// Body of `GET /api/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Connections subscribed to some topic.
    pub connections: usize,
    /// Open WebSocket sessions, subscribed or not.
    pub sessions: usize,
    /// Live topics, sorted by name.
    pub topics: Vec<TopicStats>,
}

/// Health check handler.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Relay statistics.
///
/// GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let topics = state
        .manager
        .topics()
        .await
        .into_iter()
        .map(|t| TopicStats {
            name: t.name,
            subscribers: t.subscribers,
            created_at: t.created_at.to_rfc3339(),
        })
        .collect();

    Json(StatsResponse {
        connections: state.manager.connection_count().await,
        sessions: state.active_sessions(),
        topics,
    })
}
