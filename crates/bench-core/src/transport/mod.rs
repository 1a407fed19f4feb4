//! Broker seam. The benchmark loops only see these traits; `nats` talks to a
//! real JetStream deployment and `memory` is an in-process stand-in.

use anyhow::Result;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub mod memory;
pub mod nats;

pub use memory::{MemoryBroker, MemoryEvents, MemoryHeartbeats, MemoryMessage};
pub use nats::{NatsEvents, NatsHeartbeats, NatsTransport};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Producer side of the broker.
pub trait Publisher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Durable publish; resolves once the broker has accepted the message.
    fn publish<'a>(&'a self, subject: &'a str, payload: Bytes) -> BoxFuture<'a, Result<()>>;

    /// Fire-and-forget publish on a broadcast topic.
    fn broadcast<'a>(&'a self, subject: &'a str, payload: Bytes) -> BoxFuture<'a, Result<()>>;

    fn flush(&self) -> BoxFuture<'_, Result<()>>;
}

/// Non-blocking view of a broadcast subscription.
pub trait HeartbeatFeed: Send {
    /// Next buffered message, or `None` if nothing is buffered right now.
    /// A closed subscription is an error.
    fn try_next(&mut self) -> Result<Option<Bytes>>;
}

/// A pulled message that must be acknowledged exactly once.
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];

    fn acknowledge(&self) -> BoxFuture<'_, Result<()>>;
}

/// Durable pull subscription.
pub trait EventSource: Send {
    type Message: Delivery;

    /// Up to `max` messages, waiting at most `timeout`. An empty batch is not an error.
    fn fetch(&mut self, max: usize, timeout: Duration)
        -> BoxFuture<'_, Result<Vec<Self::Message>>>;
}
