//! Publish/subscribe core.
//!
//! - [`ConnectionManager`] tracks which connections subscribe to which topic
//! - [`BroadcastRouter`] fans an event out to a topic's subscribers
//!
//! Both are generic over the payload type; the server instantiates them
//! with [`DrawEvent`].

mod connection;
mod event;
mod manager;
mod router;

pub use connection::{Connection, ConnectionId};
pub use event::DrawEvent;
pub use manager::{ConnectionManager, TopicInfo};
pub use router::{BroadcastRouter, EchoPolicy, OverflowPolicy, RouteReport};
