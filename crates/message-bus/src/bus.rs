use crate::envelope::MessageEnvelope;
use crate::error::BusError;
use crate::routes::{exchanges, queues, DEFAULT_MESSAGE_TTL_MS, DEFAULT_PREFETCH};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::{sleep, Duration};

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
/// A subscription callback. Returning `Err` nacks the message to the DLX;
/// returning `Ok` acknowledges it.
pub type Handler = Arc<dyn Fn(MessageEnvelope) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct BusHealth {
    pub connected: bool,
    pub declared_exchanges: usize,
    pub declared_queues: usize,
    pub active_subscribers: usize,
}

/// Sole inter-component communication path for trading-path messages. See
/// `AmqpMessageBus` for the real broker-backed implementation and
/// `crate::fake::InMemoryMessageBus` for the test double.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Value,
        persistent: bool,
    ) -> Result<bool, BusError>;

    async fn subscribe(
        &self,
        queue: &str,
        handler: Handler,
        auto_ack: bool,
    ) -> Result<bool, BusError>;

    /// Declares a durable, component-private queue bound to `exchange` with
    /// `pattern`, beyond the five central queues `setup_infrastructure`
    /// declares at connect time. Used by consumers that need their own view
    /// of a broadcast exchange (e.g. the Capital Manager's
    /// `events.trade_executed` subscription).
    async fn declare_and_bind(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<bool, BusError>;

    async fn health_check(&self) -> BusHealth;
}

struct BusState {
    connection: Option<Connection>,
    control_channel: Option<Channel>,
    subscriber_count: usize,
}

/// `lapin`-backed implementation. Connection loss is auto-recovered by a
/// supervising background task with exponential backoff (1s -> 60s cap),
/// the AMQP analogue of `api-client/src/live_connector.rs`'s WebSocket
/// reconnect loop.
pub struct AmqpMessageBus {
    amqp_url: String,
    state: Arc<RwLock<BusState>>,
}

impl AmqpMessageBus {
    pub async fn connect(amqp_url: impl Into<String>) -> Result<Self, BusError> {
        let amqp_url = amqp_url.into();
        let bus = Self {
            amqp_url: amqp_url.clone(),
            state: Arc::new(RwLock::new(BusState {
                connection: None,
                control_channel: None,
                subscriber_count: 0,
            })),
        };
        bus.establish().await?;
        bus.spawn_reconnect_watcher();
        Ok(bus)
    }

    async fn establish(&self) -> Result<(), BusError> {
        let connection = Connection::connect(&self.amqp_url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        Self::setup_infrastructure(&channel).await?;
        let mut state = self.state.write().await;
        state.connection = Some(connection);
        state.control_channel = Some(channel);
        Ok(())
    }

    /// Declares the four topic exchanges and five durable queues, each bound
    /// with a TTL and dead-letter-exchange argument. Grounded in
    /// `message_bus.py::_setup_infrastructure`.
    async fn setup_infrastructure(channel: &Channel) -> Result<(), BusError> {
        for exchange in [
            exchanges::EVENTS,
            exchanges::COMMANDS,
            exchanges::REQUESTS,
            exchanges::DLX,
        ] {
            channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }

        let bindings = [
            (queues::MARKET_DATA, exchanges::EVENTS, queues::MARKET_DATA_PATTERN),
            (queues::TRADE_COMMANDS, exchanges::COMMANDS, queues::TRADE_COMMANDS_PATTERN),
            (queues::CAPITAL_REQUESTS, exchanges::REQUESTS, queues::CAPITAL_REQUESTS_PATTERN),
            (queues::SYSTEM_EVENTS, exchanges::EVENTS, queues::SYSTEM_EVENTS_PATTERN),
        ];

        let mut args = FieldTable::default();
        args.insert("x-message-ttl".into(), DEFAULT_MESSAGE_TTL_MS.into());
        args.insert(
            "x-dead-letter-exchange".into(),
            exchanges::DLX.into(),
        );

        for (queue, exchange, pattern) in bindings {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    args.clone(),
                )
                .await?;
            channel
                .queue_bind(
                    queue,
                    exchange,
                    pattern,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        channel
            .queue_declare(
                queues::DEAD_LETTERS,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                queues::DEAD_LETTERS,
                exchanges::DLX,
                queues::DEAD_LETTERS_PATTERN,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        channel
            .basic_qos(DEFAULT_PREFETCH, BasicQosOptions::default())
            .await?;

        Ok(())
    }

    fn spawn_reconnect_watcher(&self) {
        let state = Arc::clone(&self.state);
        let amqp_url = self.amqp_url.clone();
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            loop {
                sleep(Duration::from_secs(5)).await;

                let connected = {
                    let guard = state.read().await;
                    guard
                        .connection
                        .as_ref()
                        .map(|c| c.status().connected())
                        .unwrap_or(false)
                };
                if connected {
                    backoff = Duration::from_secs(1);
                    continue;
                }

                tracing::warn!("message bus disconnected, attempting reconnect");
                match Connection::connect(&amqp_url, ConnectionProperties::default()).await {
                    Ok(connection) => match connection.create_channel().await {
                        Ok(channel) => {
                            if let Err(e) = Self::setup_infrastructure(&channel).await {
                                tracing::error!(error = %e, "failed to re-establish bus infrastructure");
                            } else {
                                let mut guard = state.write().await;
                                guard.connection = Some(connection);
                                guard.control_channel = Some(channel);
                                tracing::info!("message bus reconnected");
                                backoff = Duration::from_secs(1);
                                continue;
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "failed to open channel after reconnect"),
                    },
                    Err(e) => tracing::error!(error = %e, "message bus reconnect attempt failed"),
                }

                backoff = std::cmp::min(backoff * 2, Duration::from_secs(60));
                sleep(backoff).await;
            }
        });
    }
}

#[async_trait]
impl MessageBus for AmqpMessageBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Value,
        persistent: bool,
    ) -> Result<bool, BusError> {
        let envelope = MessageEnvelope::new(routing_key, payload);
        let body = serde_json::to_vec(&envelope)?;

        let channel = {
            let state = self.state.read().await;
            match &state.control_channel {
                Some(c) => c.clone(),
                None => return Ok(false),
            }
        };

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(if persistent { 2 } else { 1 });

        match channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
        {
            Ok(confirmation) => {
                if let Err(e) = confirmation.await {
                    tracing::warn!(error = %e, exchange, routing_key, "publish confirmation failed");
                    return Ok(false);
                }
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(error = %e, exchange, routing_key, "publish failed");
                Ok(false)
            }
        }
    }

    async fn subscribe(
        &self,
        queue: &str,
        handler: Handler,
        auto_ack: bool,
    ) -> Result<bool, BusError> {
        let connection = {
            let state = self.state.read().await;
            match &state.connection {
                Some(c) => c.clone(),
                None => return Ok(false),
            }
        };

        let channel = connection.create_channel().await?;
        let mut consumer = channel
            .basic_consume(
                queue,
                &format!("consumer-{}", uuid::Uuid::new_v4()),
                BasicConsumeOptions {
                    no_ack: auto_ack,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        {
            let mut state = self.state.write().await;
            state.subscriber_count += 1;
        }

        let semaphore = Arc::new(Semaphore::new(DEFAULT_PREFETCH as usize));
        let queue_name = queue.to_string();

        tokio::spawn(async move {
            while let Some(delivery_result) = consumer.next().await {
                let delivery = match delivery_result {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::error!(error = %e, queue = %queue_name, "consumer stream error");
                        continue;
                    }
                };

                let envelope: MessageEnvelope = match serde_json::from_slice(&delivery.data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::warn!(error = %e, queue = %queue_name, "malformed envelope, routing to DLX");
                        if !auto_ack {
                            let _ = delivery
                                .nack(BasicNackOptions {
                                    requeue: false,
                                    ..Default::default()
                                })
                                .await;
                        }
                        continue;
                    }
                };

                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let result = (handler)(envelope).await;
                    if auto_ack {
                        return;
                    }
                    match result {
                        Ok(()) => {
                            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                                tracing::error!(error = %e, "ack failed");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "handler failed, nacking to DLX");
                            if let Err(e) = delivery
                                .nack(BasicNackOptions {
                                    requeue: false,
                                    ..Default::default()
                                })
                                .await
                            {
                                tracing::error!(error = %e, "nack failed");
                            }
                        }
                    }
                });
            }
            tracing::warn!(queue = %queue_name, "consumer stream ended");
        });

        Ok(true)
    }

    async fn declare_and_bind(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<bool, BusError> {
        let channel = {
            let state = self.state.read().await;
            match &state.control_channel {
                Some(c) => c.clone(),
                None => return Ok(false),
            }
        };

        let mut args = FieldTable::default();
        args.insert("x-message-ttl".into(), DEFAULT_MESSAGE_TTL_MS.into());
        args.insert("x-dead-letter-exchange".into(), exchanges::DLX.into());

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await?;
        channel
            .queue_bind(
                queue,
                exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(true)
    }

    async fn health_check(&self) -> BusHealth {
        let state = self.state.read().await;
        let connected = state
            .connection
            .as_ref()
            .map(|c| c.status().connected())
            .unwrap_or(false);
        BusHealth {
            connected,
            declared_exchanges: 4,
            declared_queues: 5,
            active_subscribers: state.subscriber_count,
        }
    }
}

/// Serializes `message` and publishes it. A free function rather than a
/// trait method since `MessageBus` must stay object-safe (`Box<dyn
/// MessageBus>` is the shape every consuming crate holds).
pub async fn publish_json<B, T>(
    bus: &B,
    exchange: &str,
    routing_key: &str,
    message: &T,
    persistent: bool,
) -> Result<bool, BusError>
where
    B: MessageBus + ?Sized,
    T: serde::Serialize,
{
    let payload = serde_json::to_value(message)?;
    bus.publish(exchange, routing_key, payload, persistent).await
}
