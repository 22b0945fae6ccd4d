//! Connection handles.

use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier of one live client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A subscriber's outbound sink paired with its identity.
///
/// The session task owns the receiving half of the queue; the connection
/// manager keeps this sending half while the connection is registered.
#[derive(Debug)]
pub struct Connection<P> {
    id: ConnectionId,
    sink: mpsc::Sender<P>,
}

// Manual impl: `P` itself need not be `Clone` for the handle to be.
impl<P> Clone for Connection<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sink: self.sink.clone(),
        }
    }
}

impl<P> Connection<P> {
    /// Wrap an existing sink.
    pub fn new(id: ConnectionId, sink: mpsc::Sender<P>) -> Self {
        Self { id, sink }
    }

    /// Create a connection with a fresh bounded queue of `capacity` slots.
    ///
    /// Returns the handle and the receiving half for the session task.
    pub fn channel(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<P>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(id, tx), rx)
    }

    /// Connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Outbound sink.
    pub fn sink(&self) -> &mpsc::Sender<P> {
        &self.sink
    }
}
