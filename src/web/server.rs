//! Web server for the relay.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::{Config, WebConfig};
use crate::{RelayError, Result};

use super::router::{create_health_router, create_router};
use super::state::AppState;

/// HTTP + WebSocket server.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    state: Arc<AppState>,
    /// Web configuration.
    web_config: WebConfig,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &Config) -> Result<Self> {
        let addr = config
            .bind_addr()
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid server address: {e}")))?;

        Ok(Self {
            addr,
            state: Arc::new(AppState::new(config)),
            web_config: config.web.clone(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared state, for inspection.
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    fn app(&self) -> axum::Router {
        create_router(Arc::clone(&self.state), &self.web_config).merge(create_health_router())
    }

    /// Run the web server until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let router = self.app();
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            "Relay listening on ws://{}{}",
            local_addr,
            self.state.relay.endpoint
        );
        tracing::info!(
            destinations = ?self.state.destinations.destinations(),
            "Application destinations registered"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Relay stopped");
        Ok(())
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr> {
        let router = self.app();
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Relay listening on ws://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
