//! HTTP surface of the relay.
//!
//! Serves the STOMP-over-WebSocket endpoint that drawing clients connect to,
//! plus health and stats endpoints for operators.

pub mod destinations;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

pub use destinations::{Destinations, Route};
pub use router::{create_health_router, create_router};
pub use server::WebServer;
pub use state::AppState;
