//! Connection manager.
//!
//! Authoritative mapping from topic to live subscribers and from subscriber
//! to topic. Both maps sit behind a single lock so registration,
//! deregistration and snapshot reads never observe a half-applied change.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::connection::{Connection, ConnectionId};
use crate::{RelayError, Result};

/// Subscribers of one topic, in join order.
struct Topic<P> {
    subscribers: Vec<Connection<P>>,
    created_at: DateTime<Utc>,
}

impl<P> Topic<P> {
    fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

struct Registry<P> {
    topics: HashMap<String, Topic<P>>,
    memberships: HashMap<ConnectionId, String>,
}

/// Summary of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    /// Topic name.
    pub name: String,
    /// Number of registered subscribers.
    pub subscribers: usize,
    /// When the first subscriber arrived.
    pub created_at: DateTime<Utc>,
}

/// Tracks which connections are subscribed to which topic.
///
/// A connection belongs to at most one topic. Topics are created on first
/// registration and dropped when their last subscriber leaves.
pub struct ConnectionManager<P> {
    registry: RwLock<Registry<P>>,
}

impl<P> ConnectionManager<P> {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry {
                topics: HashMap::new(),
                memberships: HashMap::new(),
            }),
        }
    }

    /// Register a connection under a topic.
    ///
    /// Fails with [`RelayError::AlreadyRegistered`] if the connection is
    /// already tracked under any topic; the registry is left untouched.
    pub async fn register(&self, connection: Connection<P>, topic: &str) -> Result<()> {
        let id = connection.id();
        let mut registry = self.registry.write().await;

        if registry.memberships.contains_key(&id) {
            return Err(RelayError::AlreadyRegistered(id));
        }

        registry
            .topics
            .entry(topic.to_string())
            .or_insert_with(Topic::new)
            .subscribers
            .push(connection);
        registry.memberships.insert(id, topic.to_string());

        debug!(connection = %id, topic, "connection registered");
        Ok(())
    }

    /// Remove a connection from its topic.
    ///
    /// Returns the topic it was removed from, or `None` if the connection
    /// was not tracked. Calling this twice is the same as calling it once.
    pub async fn deregister(&self, id: ConnectionId) -> Option<String> {
        let mut registry = self.registry.write().await;
        let topic = registry.memberships.remove(&id)?;

        if let Some(entry) = registry.topics.get_mut(&topic) {
            entry.subscribers.retain(|c| c.id() != id);
            if entry.subscribers.is_empty() {
                registry.topics.remove(&topic);
                debug!(topic = %topic, "topic removed (no subscribers)");
            }
        }

        debug!(connection = %id, topic = %topic, "connection deregistered");
        Some(topic)
    }

    /// Remove `connection` only if it is still the handle registered for its ID.
    ///
    /// A session may unsubscribe and subscribe again with a new queue while a
    /// fan-out still holds the old handle; a failed send on the old queue
    /// must not evict the new registration.
    pub async fn remove_stale(&self, connection: &Connection<P>) -> bool {
        let id = connection.id();
        let mut registry = self.registry.write().await;
        let Some(topic) = registry.memberships.get(&id).cloned() else {
            return false;
        };

        let Some(entry) = registry.topics.get_mut(&topic) else {
            return false;
        };
        let before = entry.subscribers.len();
        entry
            .subscribers
            .retain(|c| !(c.id() == id && c.sink().same_channel(connection.sink())));
        if entry.subscribers.len() == before {
            return false;
        }
        if entry.subscribers.is_empty() {
            registry.topics.remove(&topic);
        }
        registry.memberships.remove(&id);

        debug!(connection = %id, topic = %topic, "stale connection removed");
        true
    }

    /// Snapshot of the connections subscribed to `topic`, taken at call time.
    ///
    /// Registrations and removals that happen after the call are not
    /// reflected. The returned list can be iterated any number of times.
    pub async fn subscribers_of(&self, topic: &str) -> Vec<Connection<P>> {
        self.registry
            .read()
            .await
            .topics
            .get(topic)
            .map(|t| t.subscribers.clone())
            .unwrap_or_default()
    }

    /// Topic a connection is registered under.
    pub async fn topic_of(&self, id: ConnectionId) -> Option<String> {
        self.registry.read().await.memberships.get(&id).cloned()
    }

    /// Whether a connection is registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.registry.read().await.memberships.contains_key(&id)
    }

    /// Number of subscribers of a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .await
            .topics
            .get(topic)
            .map_or(0, |t| t.subscribers.len())
    }

    /// Total number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.memberships.len()
    }

    /// All live topics, sorted by name.
    pub async fn topics(&self) -> Vec<TopicInfo> {
        let registry = self.registry.read().await;
        let mut result: Vec<TopicInfo> = registry
            .topics
            .iter()
            .map(|(name, topic)| TopicInfo {
                name: name.clone(),
                subscribers: topic.subscribers.len(),
                created_at: topic.created_at,
            })
            .collect();

        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }
}

impl<P> Default for ConnectionManager<P> {
    fn default() -> Self {
        Self::new()
    }
}
