use crate::error::WorkerError;
use crate::status::WorkerStatus;
use chrono::{DateTime, Utc};
use core_types::{Kline, StrategyId};
use events::WsMessage;
use message_bus::{routes, MessageBus};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use strategies::{OhlcvFrame, Strategy};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A health snapshot for one worker, as surfaced by
/// `StrategyWorkerManager::health_check_all`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerHealth {
    pub strategy_id: StrategyId,
    pub symbol: String,
    pub status: WorkerStatus,
    pub restart_count: u32,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Status encoded as a single atomic byte so the heartbeat loop and
/// external callers (`status()`, `health()`) never block on a lock for a
/// plain read. Transitions still go through `WorkerStatus::transition` for
/// their legality check before the atomic is updated.
fn status_to_u8(status: WorkerStatus) -> u8 {
    status as u8
}

fn status_from_u8(byte: u8) -> WorkerStatus {
    match byte {
        0 => WorkerStatus::Idle,
        1 => WorkerStatus::Starting,
        2 => WorkerStatus::Running,
        3 => WorkerStatus::Stopping,
        4 => WorkerStatus::Stopped,
        5 => WorkerStatus::Error,
        _ => WorkerStatus::Crashed,
    }
}

/// One strategy instance's supervised execution unit: a `tokio::task`
/// subscribed to its strategy's required routing keys, feeding bars
/// through `populate_indicators`/`on_data`, and publishing any resulting
/// proposal to the Capital Manager.
pub struct Worker {
    pub strategy_id: StrategyId,
    pub symbol: String,
    status: Arc<AtomicU8>,
    last_heartbeat: Arc<RwLock<Option<DateTime<Utc>>>>,
    restart_count: Arc<AtomicU32>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn status(&self) -> WorkerStatus {
        status_from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: WorkerStatus) -> Result<(), WorkerError> {
        let current = self.status();
        let next = current.transition(status)?;
        self.status.store(status_to_u8(next), Ordering::Release);
        Ok(())
    }

    pub async fn health(&self) -> WorkerHealth {
        WorkerHealth {
            strategy_id: self.strategy_id,
            symbol: self.symbol.clone(),
            status: self.status(),
            restart_count: self.restart_count.load(Ordering::Relaxed),
            last_heartbeat: *self.last_heartbeat.read().await,
        }
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::Relaxed)
    }

    /// Instantiates and runs `strategy` to completion of its lifecycle
    /// (until `stop` is called or the task errors). Steps 1-4 of the
    /// startup sequence (§4.4): the strategy is already instantiated by the
    /// caller (the Manager, via `strategies::create_strategy`); this
    /// connects to the bus, calls `on_start`, and wires each required
    /// subscription.
    pub async fn spawn(
        strategy_id: StrategyId,
        symbol: String,
        mut strategy: Box<dyn Strategy>,
        bus: Arc<dyn MessageBus>,
        ws_tx: broadcast::Sender<WsMessage>,
        heartbeat_interval: std::time::Duration,
    ) -> Result<Arc<Self>, WorkerError> {
        let status = Arc::new(AtomicU8::new(status_to_u8(WorkerStatus::Idle)));
        let last_heartbeat = Arc::new(RwLock::new(None));
        let restart_count = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let worker = Arc::new(Self {
            strategy_id,
            symbol: symbol.clone(),
            status,
            last_heartbeat,
            restart_count,
            cancel: cancel.clone(),
            task: Mutex::new(None),
        });

        worker.set_status(WorkerStatus::Starting)?;

        strategy.on_start();
        let required = strategy.get_required_subscriptions();
        for (i, routing_key) in required.iter().enumerate() {
            let queue = format!("strategy_worker_{}_{}", strategy_id, i);
            bus.declare_and_bind(&queue, routes::exchanges::EVENTS, routing_key)
                .await?;
        }

        let frame = Arc::new(Mutex::new(OhlcvFrame::new()));
        let strategy = Arc::new(Mutex::new(strategy));

        for (i, _routing_key) in required.iter().enumerate() {
            let queue = format!("strategy_worker_{}_{}", strategy_id, i);
            let strategy = Arc::clone(&strategy);
            let frame = Arc::clone(&frame);
            let bus_for_publish = Arc::clone(&bus);
            bus.subscribe(
                &queue,
                Arc::new(move |envelope: message_bus::MessageEnvelope| {
                    let strategy = Arc::clone(&strategy);
                    let frame = Arc::clone(&frame);
                    let bus_for_publish = Arc::clone(&bus_for_publish);
                    Box::pin(async move {
                        handle_tick(strategy, frame, bus_for_publish, envelope).await
                    })
                }),
                false,
            )
            .await?;
        }

        worker.set_status(WorkerStatus::Running)?;
        *worker.last_heartbeat.write().await = Some(Utc::now());
        let _ = ws_tx.send(WsMessage::Log(events::LogMessage {
            timestamp: Utc::now(),
            level: events::LogLevel::Info,
            message: format!("strategy worker {strategy_id} running on {symbol}"),
        }));

        let heartbeat_worker = Arc::clone(&worker);
        let heartbeat_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            loop {
                tokio::select! {
                    _ = heartbeat_cancel.cancelled() => {
                        strategy.lock().await.on_stop();
                        let _ = heartbeat_worker.set_status(WorkerStatus::Stopping);
                        let _ = heartbeat_worker.set_status(WorkerStatus::Stopped);
                        break;
                    }
                    _ = ticker.tick() => {
                        *heartbeat_worker.last_heartbeat.write().await = Some(Utc::now());
                    }
                }
            }
        });

        *worker.task.lock().await = Some(handle);
        Ok(worker)
    }

    /// Requests a graceful stop; the heartbeat task calls `on_stop` and
    /// transitions to `Stopped` before exiting.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }

    pub fn mark_crashed(&self) -> Result<(), WorkerError> {
        self.set_status(WorkerStatus::Crashed)
    }

    pub fn increment_restart_count(&self) -> u32 {
        self.restart_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// How long it has been since the heartbeat loop last recorded a
    /// liveness timestamp. `None` before the worker has ever ticked.
    pub async fn heartbeat_age(&self) -> Option<chrono::Duration> {
        self.last_heartbeat.read().await.map(|t| Utc::now() - t)
    }

    /// Kills the underlying task without running its graceful-stop path,
    /// simulating an unrecovered crash (end-to-end scenario 4: "abort the
    /// worker task externally"). The heartbeat then goes stale and the
    /// manager's heartbeat monitor drives the restart.
    pub async fn simulate_crash(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }
}

/// The per-tick handler: decode the bar, refresh the frame, run the
/// strategy, publish a proposal if one is produced.
async fn handle_tick(
    strategy: Arc<Mutex<Box<dyn Strategy>>>,
    frame: Arc<Mutex<OhlcvFrame>>,
    bus: Arc<dyn MessageBus>,
    envelope: message_bus::MessageEnvelope,
) -> message_bus::HandlerResult {
    let kline: Kline = envelope.decode()?;
    if !kline.is_closed {
        return Ok(());
    }

    let mut strategy = strategy.lock().await;
    let mut frame_guard = frame.lock().await;
    frame_guard.push_bar(&kline);
    let populated = strategy.populate_indicators(&frame_guard);
    *frame_guard = populated.clone();
    drop(frame_guard);

    let proposal = strategy
        .on_data(&kline, &populated)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
    drop(strategy);

    if let Some(proposal) = proposal {
        let routing_key = routes::routing_keys::capital_allocation(proposal.strategy_id);
        message_bus::publish_json(&*bus, routes::exchanges::REQUESTS, &routing_key, &proposal, true)
            .await?;
    }
    Ok(())
}
