use crate::bus::{BusHealth, Handler, MessageBus};
use crate::envelope::MessageEnvelope;
use crate::error::BusError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// An in-process test double for `MessageBus`. Routes messages to queues by
/// the same topic-pattern rules a real broker would apply, so tests can
/// exercise the DLX path (end-to-end scenario 6 in spec.md §8) without a
/// running broker.
pub struct InMemoryMessageBus {
    /// queue name -> binding pattern, mirroring `setup_infrastructure`'s
    /// fixed topology. Populated via `bind`.
    bindings: Mutex<HashMap<String, String>>,
    subscribers: Mutex<HashMap<String, Handler>>,
    published: Mutex<Vec<MessageEnvelope>>,
    dead_lettered: Mutex<Vec<MessageEnvelope>>,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        let mut bindings = HashMap::new();
        bindings.insert(
            crate::routes::queues::MARKET_DATA.to_string(),
            crate::routes::queues::MARKET_DATA_PATTERN.to_string(),
        );
        bindings.insert(
            crate::routes::queues::TRADE_COMMANDS.to_string(),
            crate::routes::queues::TRADE_COMMANDS_PATTERN.to_string(),
        );
        bindings.insert(
            crate::routes::queues::CAPITAL_REQUESTS.to_string(),
            crate::routes::queues::CAPITAL_REQUESTS_PATTERN.to_string(),
        );
        bindings.insert(
            crate::routes::queues::SYSTEM_EVENTS.to_string(),
            crate::routes::queues::SYSTEM_EVENTS_PATTERN.to_string(),
        );
        bindings.insert(
            crate::routes::queues::DEAD_LETTERS.to_string(),
            crate::routes::queues::DEAD_LETTERS_PATTERN.to_string(),
        );
        Self {
            bindings: Mutex::new(bindings),
            subscribers: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            dead_lettered: Mutex::new(Vec::new()),
        }
    }
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published_messages(&self) -> Vec<MessageEnvelope> {
        self.published.lock().unwrap().clone()
    }

    pub fn dead_lettered_messages(&self) -> Vec<MessageEnvelope> {
        self.dead_lettered.lock().unwrap().clone()
    }

    fn queue_for(&self, routing_key: &str) -> Option<String> {
        let bindings = self.bindings.lock().unwrap();
        bindings
            .iter()
            .find(|(_, pattern)| topic_matches(pattern, routing_key))
            .map(|(queue, _)| queue.clone())
    }
}

/// AMQP topic-exchange pattern matching: `*` matches exactly one
/// dot-delimited segment, `#` matches zero or more segments.
fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('.').collect();
    let key_parts: Vec<&str> = routing_key.split('.').collect();
    matches_rec(&pattern_parts, &key_parts)
}

fn matches_rec(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.first() {
        None => key.is_empty(),
        Some(&"#") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=key.len()).any(|i| matches_rec(&pattern[1..], &key[i..]))
        }
        Some(&"*") => !key.is_empty() && matches_rec(&pattern[1..], &key[1..]),
        Some(segment) => key.first() == Some(segment) && matches_rec(&pattern[1..], &key[1..]),
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(
        &self,
        _exchange: &str,
        routing_key: &str,
        payload: Value,
        _persistent: bool,
    ) -> Result<bool, BusError> {
        let envelope = MessageEnvelope::new(routing_key, payload);
        self.published.lock().unwrap().push(envelope.clone());

        let Some(queue) = self.queue_for(routing_key) else {
            return Ok(true);
        };
        let handler = self.subscribers.lock().unwrap().get(&queue).cloned();
        if let Some(handler) = handler {
            let result = (handler)(envelope.clone()).await;
            if result.is_err() {
                self.dead_lettered.lock().unwrap().push(envelope);
            }
        }
        Ok(true)
    }

    async fn subscribe(
        &self,
        queue: &str,
        handler: Handler,
        _auto_ack: bool,
    ) -> Result<bool, BusError> {
        self.subscribers
            .lock()
            .unwrap()
            .insert(queue.to_string(), handler);
        Ok(true)
    }

    async fn declare_and_bind(
        &self,
        queue: &str,
        _exchange: &str,
        pattern: &str,
    ) -> Result<bool, BusError> {
        self.bindings
            .lock()
            .unwrap()
            .insert(queue.to_string(), pattern.to_string());
        Ok(true)
    }

    async fn health_check(&self) -> BusHealth {
        BusHealth {
            connected: true,
            declared_exchanges: 4,
            declared_queues: self.bindings.lock().unwrap().len(),
            active_subscribers: self.subscribers.lock().unwrap().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_pattern_matching() {
        assert!(topic_matches("market_data.*", "market_data.btcusdt"));
        assert!(!topic_matches("market_data.*", "market_data.binance.btcusdt"));
        assert!(topic_matches("request.capital.#", "request.capital.allocation.abc"));
        assert!(topic_matches("request.capital.#", "request.capital.validation"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("events.system.*", "events.system.error"));
        assert!(!topic_matches("events.system.*", "events.system.error.extra"));
    }

    #[tokio::test]
    async fn publish_routes_to_bound_queue_and_acks() {
        let bus = InMemoryMessageBus::new();
        let received = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let received_clone = received.clone();
        bus.subscribe(
            crate::routes::queues::CAPITAL_REQUESTS,
            std::sync::Arc::new(move |env: MessageEnvelope| {
                let received = received_clone.clone();
                Box::pin(async move {
                    received.lock().unwrap().push(env);
                    Ok(())
                })
            }),
            false,
        )
        .await
        .unwrap();

        bus.publish(
            crate::routes::exchanges::REQUESTS,
            &crate::routes::routing_keys::capital_allocation(uuid::Uuid::new_v4()),
            serde_json::json!({"hello": "world"}),
            true,
        )
        .await
        .unwrap();

        assert_eq!(received.lock().unwrap().len(), 1);
        assert!(bus.dead_lettered_messages().is_empty());
    }

    #[tokio::test]
    async fn handler_error_dead_letters_the_message() {
        let bus = InMemoryMessageBus::new();
        bus.subscribe(
            crate::routes::queues::CAPITAL_REQUESTS,
            std::sync::Arc::new(move |_env: MessageEnvelope| {
                Box::pin(async move { Err("malformed payload".into()) })
            }),
            false,
        )
        .await
        .unwrap();

        bus.publish(
            crate::routes::exchanges::REQUESTS,
            "request.capital.allocation.x",
            serde_json::json!({}),
            true,
        )
        .await
        .unwrap();

        assert_eq!(bus.dead_lettered_messages().len(), 1);
    }
}
