//! STOMP session state machine.
//!
//! One [`StompSession`] per WebSocket connection. It turns inbound frames
//! into connection-manager and router calls and tells the socket loop what
//! to write back. It never touches the socket itself.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::relay::{Connection, ConnectionId, DrawEvent};
use crate::stomp::{negotiate_version, Command, Frame};
use crate::web::state::AppState;
use crate::RelayError;

/// Value of the `server` header in CONNECTED frames.
const SERVER_NAME: &str = concat!("canvas-relay/", env!("CARGO_PKG_VERSION"));

/// Protocol phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for CONNECT.
    AwaitingConnect,
    /// CONNECTED has been sent.
    Connected,
    /// The session is over; the socket should be closed.
    Closed,
}

/// The session's single topic subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Client-chosen subscription ID.
    pub id: String,
    /// Subscribed topic.
    pub topic: String,
}

/// Change to the socket loop's outbound queue.
#[derive(Debug)]
pub enum Outbound {
    /// No change.
    Keep,
    /// Start reading deliveries from this queue.
    Attach(mpsc::Receiver<DrawEvent>),
    /// Stop reading deliveries.
    Detach,
}

/// What the socket loop should do after a frame.
#[derive(Debug)]
pub struct Reply {
    /// Frames to write, in order.
    pub frames: Vec<Frame>,
    /// Outbound queue change.
    pub outbound: Outbound,
    /// Close the socket after writing `frames`.
    pub close: bool,
}

impl Reply {
    fn empty() -> Self {
        Self {
            frames: Vec::new(),
            outbound: Outbound::Keep,
            close: false,
        }
    }

    fn frame(frame: Frame) -> Self {
        Self {
            frames: vec![frame],
            ..Self::empty()
        }
    }

    /// Add a RECEIPT if the client asked for one.
    fn with_receipt(mut self, request: &Frame) -> Self {
        if let Some(receipt) = request.get("receipt") {
            self.frames
                .push(Frame::new(Command::Receipt).header("receipt-id", receipt));
        }
        self
    }
}

/// Protocol state for one WebSocket connection.
pub struct StompSession {
    id: ConnectionId,
    state: SessionState,
    subscription: Option<Subscription>,
    next_message_id: u64,
    ctx: Arc<AppState>,
}

impl StompSession {
    /// Create a session awaiting CONNECT.
    pub fn new(ctx: Arc<AppState>) -> Self {
        Self {
            id: ConnectionId::new(),
            state: SessionState::AwaitingConnect,
            subscription: None,
            next_message_id: 0,
            ctx,
        }
    }

    /// Connection ID used with the connection manager.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current protocol phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current subscription, if any.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// Process one inbound frame.
    pub async fn handle_frame(&mut self, frame: Frame) -> Reply {
        debug!(connection = %self.id, command = %frame.command, "frame received");

        match (self.state, frame.command) {
            (SessionState::Closed, _) => Reply {
                close: true,
                ..Reply::empty()
            },
            (SessionState::AwaitingConnect, Command::Connect | Command::Stomp) => {
                self.connect(&frame)
            }
            (SessionState::AwaitingConnect, _) => {
                self.fail(&frame, "not connected", "Send CONNECT before any other frame.")
                    .await
            }
            (SessionState::Connected, Command::Connect | Command::Stomp) => {
                self.fail(&frame, "already connected", "CONNECT may only be sent once.")
                    .await
            }
            (SessionState::Connected, Command::Subscribe) => self.subscribe(&frame).await,
            (SessionState::Connected, Command::Unsubscribe) => self.unsubscribe(&frame).await,
            (SessionState::Connected, Command::Send) => self.send(frame).await,
            (SessionState::Connected, Command::Disconnect) => {
                self.close().await;
                Reply {
                    close: true,
                    ..Reply::empty()
                }
                .with_receipt(&frame)
            }
            (
                SessionState::Connected,
                Command::Ack | Command::Nack | Command::Begin | Command::Commit | Command::Abort,
            ) => {
                debug!(connection = %self.id, command = %frame.command, "ignored");
                Reply::empty().with_receipt(&frame)
            }
            (
                SessionState::Connected,
                Command::Connected | Command::Message | Command::Receipt | Command::Error,
            ) => {
                let detail = format!("{} is a server frame.", frame.command);
                self.fail(&frame, "unexpected frame", detail).await
            }
        }
    }

    /// Wrap a delivered event in a MESSAGE frame for this session's subscription.
    ///
    /// Returns `None` if the session is not subscribed (a delivery raced
    /// with UNSUBSCRIBE).
    pub fn message_frame(&mut self, event: &DrawEvent) -> Option<Frame> {
        let subscription = self.subscription.as_ref()?;
        let message_id = format!("{}-{}", self.id, self.next_message_id);
        self.next_message_id += 1;

        let mut frame = Frame::new(Command::Message)
            .header("destination", subscription.topic.as_str())
            .header("subscription", subscription.id.as_str())
            .header("message-id", message_id);
        if let Some(content_type) = event.content_type() {
            frame = frame.header("content-type", content_type);
        }
        Some(
            frame
                .header("content-length", event.len().to_string())
                .body(event.body().to_vec()),
        )
    }

    /// The router closed this session's queue: it was evicted as a slow consumer.
    pub fn evicted(&mut self) -> Frame {
        warn!(connection = %self.id, "session evicted, outbound queue overflowed");
        self.subscription = None;
        self.state = SessionState::Closed;
        Frame::error(
            "slow consumer",
            "Outbound queue overflowed; the subscription was dropped.",
        )
    }

    /// Deregister from the connection manager and mark the session closed.
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        if self.subscription.take().is_some() {
            self.ctx.manager.deregister(self.id).await;
        }
        self.state = SessionState::Closed;
    }

    fn connect(&mut self, frame: &Frame) -> Reply {
        let Some(version) = negotiate_version(frame.get("accept-version")) else {
            self.state = SessionState::Closed;
            return Reply {
                frames: vec![Frame::error(
                    "unsupported protocol version",
                    "Supported versions are 1.0, 1.1 and 1.2.",
                )
                .header("version", "1.2")],
                outbound: Outbound::Keep,
                close: true,
            };
        };

        self.state = SessionState::Connected;
        info!(connection = %self.id, version, "STOMP session connected");
        Reply::frame(
            Frame::new(Command::Connected)
                .header("version", version)
                .header("heart-beat", "0,0")
                .header("server", SERVER_NAME),
        )
    }

    async fn subscribe(&mut self, frame: &Frame) -> Reply {
        let (Some(sub_id), Some(destination)) = (frame.get("id"), frame.get("destination")) else {
            return self
                .fail(frame, "missing header", "SUBSCRIBE requires id and destination.")
                .await;
        };
        if !self.ctx.relay.is_broker_destination(destination) {
            let detail = format!("{destination} is not a broadcast topic.");
            return self.fail(frame, "invalid destination", detail).await;
        }

        if self.subscription.is_some() && !self.ctx.manager.contains(self.id).await {
            // Evicted by the router; the closed queue has not been seen yet.
            let mut error = self.evicted();
            if let Some(receipt) = frame.get("receipt") {
                error = error.header("receipt-id", receipt);
            }
            return Reply {
                frames: vec![error],
                outbound: Outbound::Detach,
                close: true,
            };
        }

        let (connection, rx) =
            Connection::channel(self.id, self.ctx.relay.outbound_queue_capacity);
        match self.ctx.manager.register(connection, destination).await {
            Ok(()) => {
                info!(connection = %self.id, topic = destination, "subscribed");
                self.subscription = Some(Subscription {
                    id: sub_id.to_string(),
                    topic: destination.to_string(),
                });
                Reply {
                    outbound: Outbound::Attach(rx),
                    ..Reply::empty()
                }
                .with_receipt(frame)
            }
            Err(e @ RelayError::AlreadyRegistered(_)) => {
                // One topic per connection; a second SUBSCRIBE is a no-op.
                debug!(connection = %self.id, topic = destination, error = %e, "subscribe ignored");
                Reply::empty().with_receipt(frame)
            }
            Err(e) => {
                let detail = e.to_string();
                self.fail(frame, "subscribe failed", detail).await
            }
        }
    }

    async fn unsubscribe(&mut self, frame: &Frame) -> Reply {
        let Some(sub_id) = frame.get("id") else {
            return self
                .fail(frame, "missing header", "UNSUBSCRIBE requires id.")
                .await;
        };

        match &self.subscription {
            Some(subscription) if subscription.id == sub_id => {
                self.ctx.manager.deregister(self.id).await;
                info!(connection = %self.id, topic = %subscription.topic, "unsubscribed");
                self.subscription = None;
                Reply {
                    outbound: Outbound::Detach,
                    ..Reply::empty()
                }
                .with_receipt(frame)
            }
            _ => {
                debug!(connection = %self.id, subscription = sub_id, "unknown subscription");
                Reply::empty().with_receipt(frame)
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Reply {
        let Some(destination) = frame.get("destination").map(str::to_string) else {
            return self
                .fail(&frame, "missing header", "SEND requires destination.")
                .await;
        };

        let mut event = DrawEvent::new(frame.body.clone());
        if let Some(content_type) = frame.get("content-type") {
            event = event.with_content_type(content_type);
        }

        if self.ctx.relay.is_app_destination(&destination) {
            let Some(route) = self.ctx.destinations.resolve(&destination) else {
                let detail = format!("No handler for {destination}.");
                return self.fail(&frame, "unknown destination", detail).await;
            };
            let event = route.handle(event);
            self.ctx
                .router
                .publish(route.send_to(), event, Some(self.id))
                .await;
        } else if self.ctx.relay.is_broker_destination(&destination) {
            let own_topic = self
                .subscription
                .as_ref()
                .is_some_and(|s| s.topic == destination);
            if own_topic {
                if let Err(e) = self.ctx.router.route(event, self.id).await {
                    // Evicted between SUBSCRIBE and now; the queue close will end the session.
                    debug!(connection = %self.id, error = %e, "route skipped");
                }
            } else {
                self.ctx
                    .router
                    .publish(&destination, event, Some(self.id))
                    .await;
            }
        } else {
            let detail = format!("{destination} is neither an application nor a topic destination.");
            return self.fail(&frame, "invalid destination", detail).await;
        }

        Reply::empty().with_receipt(&frame)
    }

    /// Protocol error: reply with ERROR and end the session.
    async fn fail(&mut self, request: &Frame, message: &str, detail: impl Into<String>) -> Reply {
        let detail = detail.into();
        warn!(connection = %self.id, reason = message, detail = %detail, "protocol error");

        let mut error = Frame::error(message, detail);
        if let Some(receipt) = request.get("receipt") {
            error = error.header("receipt-id", receipt);
        }
        self.close().await;
        Reply {
            frames: vec![error],
            outbound: Outbound::Detach,
            close: true,
        }
    }
}
