//! canvas-relay - real-time collaborative drawing relay
//!
//! Browser clients connect over STOMP-on-WebSocket, subscribe to a board
//! topic and publish draw events. Every event is fanned out to all
//! subscribers of the topic, in arrival order, without persistence.

pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
pub mod stomp;
pub mod web;

pub use config::Config;
pub use error::{RelayError, Result, SendFailureReason};
