use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The wire envelope every message carries, regardless of payload shape.
///
/// Grounded in `message_bus.py`'s envelope dict of `{timestamp, routing_key, payload}`.
/// The server-side timestamp and routing key are stamped on by `publish`, not
/// by the caller, so every consumer sees a consistent value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub timestamp: DateTime<Utc>,
    pub routing_key: String,
    pub payload: Value,
}

impl MessageEnvelope {
    pub fn new(routing_key: impl Into<String>, payload: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            routing_key: routing_key.into(),
            payload,
        }
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
