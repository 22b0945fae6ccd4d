//! Application destination registry.
//!
//! Maps a SEND destination such as `/app/draw` to the handler that processes
//! the event and the topic the result is broadcast to. The table is built
//! once at startup and never changes afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::relay::DrawEvent;

/// Handler applied to an inbound event before it is broadcast.
pub type MessageHandler = Arc<dyn Fn(DrawEvent) -> DrawEvent + Send + Sync>;

/// Handler that returns the event untouched.
pub fn pass_through(event: DrawEvent) -> DrawEvent {
    event
}

/// One application destination.
#[derive(Clone)]
pub struct Route {
    handler: MessageHandler,
    send_to: String,
}

impl Route {
    /// Run the handler.
    pub fn handle(&self, event: DrawEvent) -> DrawEvent {
        (self.handler)(event)
    }

    /// Topic the handler's output is broadcast to.
    pub fn send_to(&self) -> &str {
        &self.send_to
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("send_to", &self.send_to)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Destinations`].
#[derive(Default)]
pub struct DestinationsBuilder {
    routes: HashMap<String, Route>,
}

impl DestinationsBuilder {
    /// Register `handler` for `destination`, broadcasting its output to `send_to`.
    ///
    /// A later registration for the same destination replaces the earlier one.
    pub fn route<F>(
        mut self,
        destination: impl Into<String>,
        send_to: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(DrawEvent) -> DrawEvent + Send + Sync + 'static,
    {
        self.routes.insert(
            destination.into(),
            Route {
                handler: Arc::new(handler),
                send_to: send_to.into(),
            },
        );
        self
    }

    /// Freeze the table.
    pub fn build(self) -> Destinations {
        Destinations {
            routes: self.routes,
        }
    }
}

/// Immutable destination → route table.
#[derive(Debug, Clone, Default)]
pub struct Destinations {
    routes: HashMap<String, Route>,
}

impl Destinations {
    /// Start building a table.
    pub fn builder() -> DestinationsBuilder {
        DestinationsBuilder::default()
    }

    /// The standard table: the draw destination relays to the board topic.
    pub fn from_config(relay: &RelayConfig) -> Self {
        Self::builder()
            .route(
                relay.publish_destination(),
                relay.board_topic.clone(),
                pass_through,
            )
            .build()
    }

    /// Look up the route for a destination.
    pub fn resolve(&self, destination: &str) -> Option<&Route> {
        self.routes.get(destination)
    }

    /// Registered destinations, sorted.
    pub fn destinations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered destinations.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no destination is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
