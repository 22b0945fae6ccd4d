//! Broadcast router.
//!
//! Fans one inbound event out to every subscriber of a topic. Delivery uses
//! non-blocking `try_send` into each subscriber's bounded queue, so a slow
//! subscriber can never stall the broadcast for everyone else.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::connection::{Connection, ConnectionId};
use super::manager::ConnectionManager;
use crate::error::SendFailureReason;
use crate::{RelayError, Result};

/// Whether the publisher receives its own events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoPolicy {
    /// The sender is treated like any other subscriber.
    #[default]
    Include,
    /// The sender is skipped.
    Exclude,
}

/// What to do with a subscriber whose outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Drop the event for that subscriber only; it stays subscribed.
    #[default]
    Drop,
    /// Deregister the subscriber; its session closes once its queue drains.
    Disconnect,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Topic the event was broadcast to.
    pub topic: String,
    /// Subscribers whose queue accepted the event.
    pub delivered: usize,
    /// Subscribers that missed the event because their queue was full.
    pub dropped: usize,
    /// Subscribers deregistered during this fan-out.
    pub removed: usize,
    /// Subscribers skipped by the echo policy.
    pub skipped: usize,
}

/// Delivers events to the subscribers tracked by a [`ConnectionManager`].
pub struct BroadcastRouter<P> {
    manager: Arc<ConnectionManager<P>>,
    echo: EchoPolicy,
    overflow: OverflowPolicy,
}

impl<P: Clone> BroadcastRouter<P> {
    /// Create a router with the default policies (echo, drop on overflow).
    pub fn new(manager: Arc<ConnectionManager<P>>) -> Self {
        Self {
            manager,
            echo: EchoPolicy::default(),
            overflow: OverflowPolicy::default(),
        }
    }

    /// Set the echo policy.
    pub fn with_echo(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// The manager this router reads subscribers from.
    pub fn manager(&self) -> &Arc<ConnectionManager<P>> {
        &self.manager
    }

    /// Echo policy in effect.
    pub fn echo(&self) -> EchoPolicy {
        self.echo
    }

    /// Route an event to every subscriber of the source connection's topic.
    ///
    /// Returns [`RelayError::UnknownConnection`] if the source is not
    /// registered; nothing is delivered in that case. Callers treat that as
    /// benign since the source may have just disconnected.
    pub async fn route(&self, event: P, source: ConnectionId) -> Result<RouteReport> {
        let topic = self
            .manager
            .topic_of(source)
            .await
            .ok_or(RelayError::UnknownConnection(source))?;

        Ok(self.publish(&topic, event, Some(source)).await)
    }

    /// Broadcast an event to every subscriber of `topic`.
    ///
    /// `source` is the publishing connection, if any; the echo policy is
    /// applied against it. Per-subscriber failures never abort the fan-out.
    pub async fn publish(
        &self,
        topic: &str,
        event: P,
        source: Option<ConnectionId>,
    ) -> RouteReport {
        let subscribers = self.manager.subscribers_of(topic).await;
        let mut report = RouteReport {
            topic: topic.to_string(),
            ..RouteReport::default()
        };
        let mut evict: Vec<Connection<P>> = Vec::new();

        for connection in &subscribers {
            if self.echo == EchoPolicy::Exclude && Some(connection.id()) == source {
                report.skipped += 1;
                continue;
            }

            match deliver(connection, event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e @ RelayError::SendFailure {
                    reason: SendFailureReason::QueueFull,
                    ..
                }) => {
                    warn!(topic, error = %e, "subscriber is not keeping up");
                    match self.overflow {
                        OverflowPolicy::Drop => report.dropped += 1,
                        OverflowPolicy::Disconnect => evict.push(connection.clone()),
                    }
                }
                Err(e) => {
                    warn!(topic, error = %e, "delivery failed, removing subscriber");
                    evict.push(connection.clone());
                }
            }
        }

        // Release our sink handles so evicted sessions see their queue close.
        drop(subscribers);
        for connection in evict {
            if self.manager.remove_stale(&connection).await {
                report.removed += 1;
            }
        }

        debug!(
            topic,
            delivered = report.delivered,
            dropped = report.dropped,
            removed = report.removed,
            "event routed"
        );
        report
    }
}

/// Push one event into a subscriber's queue without waiting.
fn deliver<P>(connection: &Connection<P>, event: P) -> Result<()> {
    connection
        .sink()
        .try_send(event)
        .map_err(|e| RelayError::SendFailure {
            connection: connection.id(),
            reason: match e {
                TrySendError::Full(_) => SendFailureReason::QueueFull,
                TrySendError::Closed(_) => SendFailureReason::Closed,
            },
        })
}
