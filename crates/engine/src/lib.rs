//! Core Engine (§4.7): the top-level orchestrator that brings every other
//! component up in dependency order, runs the background health,
//! reconciliation, and metrics loops, and exposes the operations the CLI
//! entrypoint drives.
//!
//! Grounded in the teacher's own `Engine` (construction, an `init` startup
//! sequence, a `run` loop) generalized from a single hardcoded bot map into
//! a supervisor over the Exchange Connector, Capital Manager, and Strategy
//! Worker Manager, with graceful shutdown and periodic background work
//! added per §4.7's lifecycle contract.

pub mod error;
pub mod reconciler;

pub use error::EngineError;
pub use reconciler::{ReconciliationReport, StateReconciliationEngine};

use alerter::TelegramAlerter;
use api_client::{BinanceConnector, ExchangeConnector, HealthReport, MarketDataHandler};
use capital_manager::CapitalManager;
use configuration::AppConfig;
use core_types::{StrategyId, StrategyKind};
use database::DbRepository;
use events::WsMessage;
use message_bus::{AmqpMessageBus, MessageBus};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strategy_worker::{FleetHealth, StrategyWorkerManager, WorkerHealth};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const RECONCILIATION_INTERVAL: Duration = Duration::from_secs(5 * 60);
const METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// Kline granularity subscribed to on strategies' behalf. Nothing in
/// `ExchangeConfig` names a timeframe independent of each strategy's own
/// indicator windows, so every active strategy is fed the same base bar and
/// resamples its own indicators from it, matching `MACrossover`'s OHLCV
/// assumptions.
const DEFAULT_KLINE_INTERVAL: &str = "1m";

/// Opens the WebSocket kline stream for `symbols` and republishes each
/// closed bar onto the `events` exchange under the
/// `market_data.kline.<SYMBOL>` routing key that `Worker::spawn` binds its
/// per-strategy queue to (see `strategies::MACrossover::get_required_subscriptions`).
///
/// The stream hands the handler Binance's wire-format symbol (uppercase, no
/// separator — e.g. `BTCUSDT`), not the `BASE/QUOTE` form strategies
/// subscribe under, so a reverse lookup restores the original symbol before
/// republishing. `MarketDataHandler` is a synchronous callback invoked from
/// inside the stream's read loop, so the publish itself is handed off to a
/// spawned task rather than run inline.
async fn bridge_market_data(
    connector: &Arc<dyn ExchangeConnector>,
    bus: &Arc<dyn MessageBus>,
    symbols: &[String],
) -> Result<(), EngineError> {
    if symbols.is_empty() {
        return Ok(());
    }

    let wire_to_symbol: HashMap<String, String> =
        symbols.iter().map(|s| (s.to_uppercase().replace('/', ""), s.clone())).collect();

    let bus = Arc::clone(bus);
    let handler: MarketDataHandler = Arc::new(move |wire_symbol, kline| {
        let Some(symbol) = wire_to_symbol.get(&wire_symbol).cloned() else {
            tracing::warn!(wire_symbol, "received kline for a symbol with no active subscriber");
            return;
        };
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            let routing_key = format!("market_data.kline.{symbol}");
            if let Err(e) = message_bus::publish_json(
                &*bus,
                message_bus::routes::exchanges::EVENTS,
                &routing_key,
                &kline,
                false,
            )
            .await
            {
                tracing::error!(error = %e, %routing_key, "failed to republish kline onto event bus");
            }
        });
    });

    connector
        .subscribe_market_data(symbols, DEFAULT_KLINE_INTERVAL, handler)
        .await
        .map_err(|e| EngineError::StartupFailed(format!("market data subscription failed: {e}")))
}

/// Snapshot returned by `get_status`/`health_check`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub connector_health: ConnectorHealthSnapshot,
    pub bus_connected: bool,
    pub fleet: FleetHealth,
}

/// `get_strategy_status(id?)`'s return shape: a single worker's health
/// (`None` if the id is unknown) or the whole fleet's, depending on whether
/// a `strategy_id` was given.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StrategyStatusReport {
    One(Option<WorkerHealth>),
    Fleet(FleetHealth),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorHealthSnapshot {
    pub connected: bool,
    pub circuit_open: bool,
}

impl From<HealthReport> for ConnectorHealthSnapshot {
    fn from(report: HealthReport) -> Self {
        Self {
            connected: matches!(report.state, api_client::ConnectorHealth::Connected),
            circuit_open: matches!(report.circuit_state, api_client::circuit_breaker::CircuitState::Open),
        }
    }
}

/// The central orchestrator. Holds every long-lived component and the
/// handles of the background tasks it spawns at `start`.
pub struct Engine {
    config: Arc<AppConfig>,
    db: DbRepository,
    bus: Arc<dyn MessageBus>,
    connector: Arc<dyn ExchangeConnector>,
    capital_manager: Arc<CapitalManager<dyn MessageBus>>,
    worker_manager: Arc<StrategyWorkerManager>,
    reconciler: Arc<StateReconciliationEngine>,
    ws_tx: broadcast::Sender<WsMessage>,
    cancel: CancellationToken,
    running: AtomicBool,
    background_tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Brings up every component in the dependency order §4.7 names:
    /// database, message bus, Exchange Connector, Capital Manager, Strategy
    /// Worker Manager. Fails fast (`StartupFailed`) if the portfolio table
    /// is empty, the message bus is unreachable, or the connector cannot
    /// establish a session; components already started are torn down
    /// before the error is returned.
    pub async fn start(config: AppConfig) -> Result<Arc<Self>, EngineError> {
        config.validate()?;
        let config = Arc::new(config);
        let (ws_tx, _ws_rx) = broadcast::channel(256);

        let pool = database::connect().await?;
        database::run_migrations(&pool).await?;
        let db = DbRepository::new(pool);

        let bus: Arc<dyn MessageBus> = match AmqpMessageBus::connect(config.message_bus.amqp_url()).await {
            Ok(bus) => Arc::new(bus),
            Err(e) => return Err(EngineError::StartupFailed(format!("message bus connect failed: {e}"))),
        };

        let connector: Arc<dyn ExchangeConnector> =
            Arc::new(BinanceConnector::new(&config.exchange, Some(Arc::clone(&bus))));
        if let Err(e) = connector.connect().await {
            return Err(EngineError::StartupFailed(format!("exchange connector connect failed: {e}")));
        }

        let capital_manager =
            match CapitalManager::start(config.risk_parameters.clone(), db.clone(), Arc::clone(&bus), ws_tx.clone())
                .await
            {
                Ok(manager) => manager,
                Err(e) => {
                    connector.disconnect().await;
                    return Err(EngineError::StartupFailed(format!("capital manager startup failed: {e}")));
                }
            };

        let worker_manager = StrategyWorkerManager::new(Arc::clone(&config), Arc::clone(&bus), ws_tx.clone());

        let active_strategies: Vec<(StrategyId, StrategyKind, String)> = db
            .list_active_strategies()
            .await?
            .into_iter()
            .map(|s| (s.strategy_id, StrategyKind::MovingAverageCrossover, s.symbol))
            .collect();
        let start_results = worker_manager.start_all(&active_strategies).await;
        for (strategy_id, result) in start_results {
            if let Err(e) = result {
                tracing::error!(%strategy_id, error = %e, "failed to start strategy worker at engine startup");
            }
        }

        let mut subscribed_symbols: Vec<String> =
            active_strategies.iter().map(|(_, _, symbol)| symbol.clone()).collect();
        subscribed_symbols.sort();
        subscribed_symbols.dedup();
        if let Err(e) = bridge_market_data(&connector, &bus, &subscribed_symbols).await {
            connector.disconnect().await;
            return Err(e);
        }

        let reconciler =
            Arc::new(StateReconciliationEngine::new(db.clone(), Arc::clone(&connector), ws_tx.clone()));

        let engine = Arc::new(Self {
            config,
            db,
            bus,
            connector,
            capital_manager,
            worker_manager,
            reconciler,
            ws_tx,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(true),
            background_tasks: tokio::sync::Mutex::new(Vec::new()),
        });

        engine.spawn_background_loops().await;
        engine.spawn_signal_handler();

        tracing::info!("core engine started");
        Ok(engine)
    }

    async fn spawn_background_loops(self: &Arc<Self>) {
        let mut tasks = self.background_tasks.lock().await;

        tasks.push(Arc::clone(&self.worker_manager).spawn_resource_monitor(Duration::from_secs(10)));
        tasks.push(
            Arc::clone(&self.worker_manager)
                .spawn_heartbeat_monitor(Duration::from_secs(self.config.worker.heartbeat_interval_secs)),
        );
        tasks.push(Arc::clone(&self.reconciler).start(RECONCILIATION_INTERVAL, self.cancel.clone()));
        tasks.push(self.spawn_health_loop());
        tasks.push(self.spawn_metrics_loop());
        if let Some(task) = self.spawn_alerter() {
            tasks.push(task);
        }
    }

    /// Spawns the Telegram alerter as a fan-out consumer of the same
    /// broadcast channel the UI and diagnostics subscribe to. Absent
    /// credentials disable alerting entirely rather than failing startup.
    fn spawn_alerter(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let alerter = TelegramAlerter::new(&self.config.telegram)?;
        let event_rx = self.ws_tx.subscribe();
        Some(tokio::spawn(alerter::run_alerter_service(alerter, event_rx)))
    }

    fn spawn_health_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let status = engine.health_check().await;
                        if !status.bus_connected || !status.connector_health.connected {
                            tracing::error!(?status, "component unhealthy");
                        }
                    }
                }
            }
        })
    }

    fn spawn_metrics_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(METRICS_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let fleet = engine.worker_manager.health_check_all().await;
                        let now = chrono::Utc::now();
                        if let Err(e) = engine
                            .db
                            .record_metric(
                                uuid::Uuid::new_v4(),
                                None,
                                None,
                                "active_strategy_workers",
                                rust_decimal::Decimal::from(fleet.running),
                                now,
                            )
                            .await
                        {
                            tracing::error!(error = %e, "failed to record fleet metric");
                        }
                    }
                }
            }
        })
    }

    /// Listens for SIGINT/SIGTERM and triggers the same graceful shutdown
    /// path `stop` does.
    fn spawn_signal_handler(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT"),
                    _ = terminate.recv() => tracing::info!("received SIGTERM"),
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
                tracing::info!("received Ctrl-C");
            }
            engine.stop().await;
        });
    }

    /// Graceful shutdown: stops accepting new work, stops every strategy
    /// worker, cancels the background loops, and disconnects the exchange
    /// connector. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("core engine stopping");
        self.cancel.cancel();
        self.worker_manager.stop_all().await;
        self.connector.disconnect().await;

        let mut tasks = self.background_tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        tracing::info!("core engine stopped");
    }

    /// Aborts every background task and disconnects the connector
    /// immediately, without waiting for workers to wind down. Used when
    /// `start` fails partway through initialization rather than during
    /// routine shutdown.
    pub async fn emergency_shutdown(&self, reason: String) {
        tracing::error!(reason = %reason, "engine emergency shutdown");
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        let mut tasks = self.background_tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        self.connector.disconnect().await;
        let _ = self.capital_manager.emergency_stop(reason).await;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn get_status(&self) -> EngineStatus {
        self.health_check().await
    }

    pub async fn health_check(&self) -> EngineStatus {
        let connector_health = self.connector.health_check().await;
        let bus_health = self.bus.health_check().await;
        let fleet = self.worker_manager.health_check_all().await;
        EngineStatus {
            running: self.is_running(),
            connector_health: connector_health.into(),
            bus_connected: bus_health.connected,
            fleet,
        }
    }

    /// Starts a worker and subscribes its symbol on the exchange connector,
    /// so a strategy added after `start` still receives market data rather
    /// than only the ones present at startup.
    pub async fn start_strategy(&self, strategy_id: StrategyId, kind: StrategyKind, symbol: String) -> Result<(), EngineError> {
        self.worker_manager.start(strategy_id, kind, symbol.clone()).await.map_err(EngineError::from)?;
        bridge_market_data(&self.connector, &self.bus, std::slice::from_ref(&symbol)).await
    }

    pub async fn stop_strategy(&self, strategy_id: StrategyId) -> Result<(), EngineError> {
        self.worker_manager.stop(strategy_id).await.map_err(EngineError::from)
    }

    pub async fn restart_strategy(&self, strategy_id: StrategyId) -> Result<(), EngineError> {
        self.worker_manager.restart(strategy_id).await.map_err(EngineError::from)
    }

    /// `get_strategy_status(id?)` (§4.7): a single worker's health when
    /// `strategy_id` is given, otherwise the whole fleet's.
    pub async fn get_strategy_status(&self, strategy_id: Option<StrategyId>) -> StrategyStatusReport {
        match strategy_id {
            Some(id) => StrategyStatusReport::One(self.worker_manager.health_check_one(id).await),
            None => StrategyStatusReport::Fleet(self.worker_manager.health_check_all().await),
        }
    }

    /// Runs a single reconciliation pass on demand (the `reconcile` CLI
    /// subcommand, rather than waiting for the 5-minute background tick).
    pub async fn reconcile_now(&self) -> Result<ReconciliationReport, EngineError> {
        self.reconciler.run_once().await
    }

    pub fn subscribe_ws(&self) -> broadcast::Receiver<WsMessage> {
        self.ws_tx.subscribe()
    }
}
