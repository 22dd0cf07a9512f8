//! Topic-routed pub/sub with durable queues, dead-letter routing, and
//! per-message TTL. The sole inter-component communication path for
//! trading-path data.

pub mod bus;
pub mod envelope;
pub mod error;
pub mod fake;
pub mod routes;

pub use bus::{publish_json, AmqpMessageBus, BusHealth, Handler, HandlerFuture, HandlerResult, MessageBus};
pub use envelope::MessageEnvelope;
pub use error::BusError;
pub use fake::InMemoryMessageBus;
