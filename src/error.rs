//! Error types for the canvas relay.

use thiserror::Error;

use crate::relay::ConnectionId;
use crate::stomp::FrameError;

/// Why a delivery to a subscriber's outbound queue failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailureReason {
    /// The subscriber's bounded queue is full.
    QueueFull,
    /// The subscriber's session has gone away.
    Closed,
}

impl std::fmt::Display for SendFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendFailureReason::QueueFull => write!(f, "outbound queue full"),
            SendFailureReason::Closed => write!(f, "connection closed"),
        }
    }
}

/// Common error type for the relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The connection is already tracked by the connection manager.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// The connection is not (or no longer) tracked.
    ///
    /// Disconnects race with cleanup, so callers treat this as benign.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// Writing to a subscriber's outbound sink failed.
    #[error("send to connection {connection} failed: {reason}")]
    SendFailure {
        /// The subscriber that could not be reached.
        connection: ConnectionId,
        /// What went wrong.
        reason: SendFailureReason,
    },

    /// The WebSocket upgrade handshake was rejected.
    #[error("protocol upgrade failed: {0}")]
    ProtocolUpgrade(String),

    /// The server is at its connection limit.
    #[error("too many connections")]
    TooManyConnections,

    /// STOMP frame could not be decoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
