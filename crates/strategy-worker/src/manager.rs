use crate::error::WorkerError;
use crate::resources::ResourceSampler;
use crate::status::WorkerStatus;
use crate::worker::{Worker, WorkerHealth};
use configuration::{AppConfig, WorkerConfig};
use core_types::{StrategyId, StrategyKind};
use events::WsMessage;
use message_bus::MessageBus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strategies::create_strategy;
use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;

struct WorkerSlot {
    handle: Arc<Worker>,
    kind: StrategyKind,
    symbol: String,
}

/// A fleet health report: per-worker status plus aggregate totals, the shape
/// `health_check_all` returns.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FleetHealth {
    pub workers: Vec<WorkerHealth>,
    pub running: usize,
    pub crashed: usize,
    pub total: usize,
}

/// Supervises a fleet of Strategy Workers keyed by strategy id. Generalizes
/// the teacher's `engine::Engine.bots: HashMap<String, Bot>` from a static
/// map populated once at startup into a full add/remove/restart supervisor
/// with resource-cap enforcement.
pub struct StrategyWorkerManager {
    config: Arc<AppConfig>,
    bus: Arc<dyn MessageBus>,
    ws_tx: broadcast::Sender<WsMessage>,
    workers: Mutex<HashMap<StrategyId, WorkerSlot>>,
    sampler: Mutex<ResourceSampler>,
}

impl StrategyWorkerManager {
    pub fn new(config: Arc<AppConfig>, bus: Arc<dyn MessageBus>, ws_tx: broadcast::Sender<WsMessage>) -> Arc<Self> {
        Arc::new(Self {
            config,
            bus,
            ws_tx,
            workers: Mutex::new(HashMap::new()),
            sampler: Mutex::new(ResourceSampler::new()),
        })
    }

    fn worker_config(&self) -> &WorkerConfig {
        &self.config.worker
    }

    /// Registers a new strategy instance without starting it.
    pub async fn add(&self, strategy_id: StrategyId, kind: StrategyKind, symbol: String) -> Result<(), WorkerError> {
        let strategy = create_strategy(strategy_id, kind, &self.config, &symbol)?;
        let worker = Worker::spawn(
            strategy_id,
            symbol.clone(),
            strategy,
            Arc::clone(&self.bus),
            self.ws_tx.clone(),
            Duration::from_secs(self.worker_config().heartbeat_interval_secs),
        )
        .await?;
        self.workers.lock().await.insert(
            strategy_id,
            WorkerSlot { handle: worker, kind, symbol },
        );
        Ok(())
    }

    pub async fn remove(&self, strategy_id: StrategyId) -> Result<(), WorkerError> {
        let slot = self.workers.lock().await.remove(&strategy_id);
        match slot {
            Some(slot) => {
                slot.handle.stop().await;
                Ok(())
            }
            None => Err(WorkerError::NotFound(strategy_id)),
        }
    }

    /// `start`/`stop` here mean "(re)register a worker and drive it through
    /// the lifecycle" — `add` already starts the worker, so these exist as
    /// the explicit named operations the manager's operation set calls for.
    pub async fn start(&self, strategy_id: StrategyId, kind: StrategyKind, symbol: String) -> Result<(), WorkerError> {
        self.add(strategy_id, kind, symbol).await
    }

    pub async fn stop(&self, strategy_id: StrategyId) -> Result<(), WorkerError> {
        self.remove(strategy_id).await
    }

    /// Stops and re-adds a worker, incrementing its restart budget counter.
    /// Exhausting `max_restart_attempts` marks the worker `Crashed` and
    /// returns an error rather than retrying further.
    pub async fn restart(&self, strategy_id: StrategyId) -> Result<(), WorkerError> {
        let (kind, symbol, restart_count) = {
            let workers = self.workers.lock().await;
            let slot = workers.get(&strategy_id).ok_or(WorkerError::NotFound(strategy_id))?;
            (slot.kind, slot.symbol.clone(), slot.handle.restart_count())
        };

        if restart_count >= self.worker_config().max_restart_attempts {
            if let Some(slot) = self.workers.lock().await.get(&strategy_id) {
                let _ = slot.handle.mark_crashed();
            }
            let _ = self.ws_tx.send(WsMessage::Log(events::LogMessage {
                timestamp: chrono::Utc::now(),
                level: events::LogLevel::Error,
                message: format!(
                    "strategy worker {strategy_id} exhausted {} restart attempts; marked crashed",
                    self.worker_config().max_restart_attempts
                ),
            }));
            return Err(WorkerError::Crashed(strategy_id));
        }

        self.remove(strategy_id).await?;
        tokio::time::sleep(Duration::from_secs(self.worker_config().restart_delay_secs)).await;
        self.add(strategy_id, kind, symbol).await?;

        if let Some(slot) = self.workers.lock().await.get(&strategy_id) {
            let attempt = slot.handle.increment_restart_count();
            tracing::warn!(%strategy_id, attempt, "strategy worker restarted");
        }
        Ok(())
    }

    pub async fn start_all(&self, strategies: &[(StrategyId, StrategyKind, String)]) -> Vec<(StrategyId, Result<(), WorkerError>)> {
        let mut results = Vec::with_capacity(strategies.len());
        for (strategy_id, kind, symbol) in strategies {
            let result = self.add(*strategy_id, *kind, symbol.clone()).await;
            results.push((*strategy_id, result));
        }
        results
    }

    pub async fn stop_all(&self) {
        let ids: Vec<StrategyId> = self.workers.lock().await.keys().copied().collect();
        for id in ids {
            let _ = self.remove(id).await;
        }
    }

    /// Single-worker counterpart of `health_check_all`, for `get_strategy_status(id)`.
    pub async fn health_check_one(&self, strategy_id: StrategyId) -> Option<WorkerHealth> {
        let workers = self.workers.lock().await;
        let slot = workers.get(&strategy_id)?;
        Some(slot.handle.health().await)
    }

    pub async fn health_check_all(&self) -> FleetHealth {
        let workers = self.workers.lock().await;
        let mut health = Vec::with_capacity(workers.len());
        for slot in workers.values() {
            health.push(slot.handle.health().await);
        }
        let running = health.iter().filter(|h| h.status == WorkerStatus::Running).count();
        let crashed = health.iter().filter(|h| h.status == WorkerStatus::Crashed).count();
        FleetHealth { total: health.len(), running, crashed, workers: health }
    }

    /// Spawns the background sampler: every `sample_interval`, reads the
    /// whole-process CPU/memory (every worker shares one OS process in
    /// this task-based redesign — see `resources::ResourceSampler`'s doc
    /// comment) and restarts the fleet's oldest-running worker if either
    /// cap is breached, using the same restart-budget mechanism as crash
    /// recovery. Caps cannot be attributed to a single worker under this
    /// model, so load-shedding one worker at a time is a deliberate
    /// simplification, noted in DESIGN.md.
    pub fn spawn_resource_monitor(self: &Arc<Self>, sample_interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(sample_interval);
            loop {
                ticker.tick().await;
                let usage = manager.sampler.lock().await.sample();
                let cfg = manager.worker_config();
                let breached = usage.memory_mb > cfg.max_memory_mb || usage.cpu_percent > cfg.max_cpu_percent;
                if !breached {
                    continue;
                }
                tracing::warn!(
                    memory_mb = usage.memory_mb,
                    cpu_percent = usage.cpu_percent,
                    "resource cap breached"
                );
                let candidate = {
                    let workers = manager.workers.lock().await;
                    workers
                        .values()
                        .filter(|s| s.handle.status() == WorkerStatus::Running)
                        .map(|s| s.handle.strategy_id)
                        .next()
                };
                if let Some(strategy_id) = candidate {
                    if let Err(e) = manager.restart(strategy_id).await {
                        tracing::error!(%strategy_id, error = %e, "resource-cap restart failed");
                    }
                }
            }
        })
    }

    /// Spawns the crash detector: every `check_interval`, any `Running`
    /// worker whose heartbeat is older than `2 * heartbeat_interval`
    /// (§8 scenario 4) is treated as crashed and restarted through the same
    /// restart-budget path `restart` uses for an explicit crash report.
    pub fn spawn_heartbeat_monitor(self: &Arc<Self>, check_interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(check_interval);
            loop {
                ticker.tick().await;
                let stale_threshold =
                    chrono::Duration::seconds(2 * manager.worker_config().heartbeat_interval_secs as i64);

                let stale: Vec<StrategyId> = {
                    let workers = manager.workers.lock().await;
                    let mut stale = Vec::new();
                    for slot in workers.values() {
                        if slot.handle.status() != WorkerStatus::Running {
                            continue;
                        }
                        if let Some(age) = slot.handle.heartbeat_age().await {
                            if age > stale_threshold {
                                stale.push(slot.handle.strategy_id);
                            }
                        }
                    }
                    stale
                };

                for strategy_id in stale {
                    tracing::warn!(%strategy_id, "missed heartbeat, restarting worker");
                    if let Err(e) = manager.restart(strategy_id).await {
                        tracing::error!(%strategy_id, error = %e, "crash restart failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::{AppConfig, DatabaseConfig, Environment, ExchangeConfig, MACrossoverParams, MessageBusConfig, RiskParameters, TelegramConfig, WorkerConfig};
    use message_bus::InMemoryMessageBus;

    fn test_config(heartbeat_secs: u64, max_restart_attempts: u32) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            environment: Environment::Development,
            database: DatabaseConfig { url: String::new() },
            message_bus: MessageBusConfig {
                host: "localhost".to_string(),
                port: 5672,
                user: "guest".to_string(),
                password: "guest".to_string(),
                vhost: "/".to_string(),
            },
            exchange: ExchangeConfig {
                exchange_name: "binance".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
                sandbox: true,
                rate_limit_per_minute: 1200,
                timeout_secs: 30,
            },
            risk_parameters: RiskParameters::default(),
            worker: WorkerConfig {
                heartbeat_interval_secs: heartbeat_secs,
                max_restart_attempts,
                restart_delay_secs: 0,
                ..WorkerConfig::default()
            },
            telegram: TelegramConfig::default(),
            ma_crossover: MACrossoverParams::default(),
            jwt_secret_key: String::new(),
            log_level: "info".to_string(),
        })
    }

    #[tokio::test]
    async fn worker_crash_triggers_auto_restart_up_to_the_budget_then_crashes() {
        let config = test_config(1, 2);
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryMessageBus::new());
        let (ws_tx, _) = broadcast::channel(16);
        let manager = StrategyWorkerManager::new(config, bus, ws_tx);

        let strategy_id = StrategyId::new();
        manager
            .add(strategy_id, StrategyKind::MovingAverageCrossover, "BTC/USDT".to_string())
            .await
            .unwrap();

        let _monitor = manager.spawn_heartbeat_monitor(Duration::from_millis(100));

        for expected_restart_count in [1u32, 2] {
            {
                let workers = manager.workers.lock().await;
                workers.get(&strategy_id).unwrap().handle.simulate_crash().await;
            }
            // Wait past the stale threshold (2 * heartbeat_interval) plus a
            // couple of monitor ticks for the restart to land.
            tokio::time::sleep(Duration::from_millis(2_300)).await;
            let health = manager.health_check_all().await;
            let worker = health.workers.iter().find(|w| w.strategy_id == strategy_id).unwrap();
            assert_eq!(worker.restart_count, expected_restart_count);
            assert_eq!(worker.status, WorkerStatus::Running);
        }

        // Third crash exhausts the budget: the worker is marked Crashed and
        // health reporting surfaces it as unhealthy.
        {
            let workers = manager.workers.lock().await;
            workers.get(&strategy_id).unwrap().handle.simulate_crash().await;
        }
        tokio::time::sleep(Duration::from_millis(2_300)).await;
        let health = manager.health_check_all().await;
        assert_eq!(health.crashed, 1);
        let worker = health.workers.iter().find(|w| w.strategy_id == strategy_id).unwrap();
        assert_eq!(worker.status, WorkerStatus::Crashed);
    }
}
