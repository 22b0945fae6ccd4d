//! WebSocket transport for STOMP clients.

pub mod handler;
pub mod session;

pub use handler::stomp_ws_handler;
pub use session::{Outbound, Reply, SessionState, StompSession, Subscription};
