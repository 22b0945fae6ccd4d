//! Shared application state.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{Config, RelayConfig};
use crate::relay::{BroadcastRouter, ConnectionManager, DrawEvent};

use super::destinations::Destinations;

/// State shared by every request handler and WebSocket session.
pub struct AppState {
    /// Topic subscriptions.
    pub manager: Arc<ConnectionManager<DrawEvent>>,
    /// Fan-out over `manager`.
    pub router: BroadcastRouter<DrawEvent>,
    /// Application destination table.
    pub destinations: Destinations,
    /// Relay settings.
    pub relay: RelayConfig,
    /// One permit per allowed WebSocket session.
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl AppState {
    /// Build the state from configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_destinations(config, Destinations::from_config(&config.relay))
    }

    /// Build the state with a custom destination table.
    pub fn with_destinations(config: &Config, destinations: Destinations) -> Self {
        let manager = Arc::new(ConnectionManager::new());
        let router = BroadcastRouter::new(Arc::clone(&manager))
            .with_echo(config.relay.echo)
            .with_overflow(config.relay.overflow);

        Self {
            manager,
            router,
            destinations,
            relay: config.relay.clone(),
            slots: Arc::new(Semaphore::new(config.server.max_connections)),
            max_connections: config.server.max_connections,
        }
    }

    /// Claim a session slot without waiting. `None` when the server is full.
    pub fn try_acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slots).try_acquire_owned().ok()
    }

    /// Number of WebSocket sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.max_connections - self.slots.available_permits()
    }

    /// Maximum number of WebSocket sessions.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}
