//! # Capital Manager Crate
//!
//! Owns the Portfolio ledger, its risk rules, and the open-position map; the
//! sole authority for whether a strategy's trade proposal may reach the
//! exchange. Every other component only ever sees its verdicts.
//!
//! Startup sequence, validation pipeline, and trade-executed handling all
//! follow §4.5 of the design spec; the individual `ValidationRule`s live in
//! [`validation_rules`] and must not be reordered.

pub mod error;
pub mod interfaces;
pub mod validation_rules;

pub use error::RiskError;
pub use interfaces::{
    PortfolioMetrics, PositionInfo, RiskLevel, TradeExecution, TradeRequest, ValidationResponse,
    ValidationResult,
};

use chrono::{DateTime, Utc};
use configuration::RiskParameters;
use core_types::{
    LogSeverity, OrderSide, Portfolio, PortfolioRule, PortfolioRuleKind, Position, PositionSide,
    StrategyId, SystemLog, TradeProposal,
};
use database::DbRepository;
use events::{CircuitBreakerTripped, EmergencyStopEngaged, WsMessage};
use message_bus::{routes, MessageBus};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;
use validation_rules::{ValidationContext, ValidationRuleEngine};

/// At most one open position per (strategy, symbol) for spot, per §3's
/// Position invariant.
type PositionKey = (StrategyId, String);

struct ManagerState {
    portfolio: Portfolio,
    #[allow(dead_code)] // carried for future rule additions; no rule reads the list directly yet
    rules: Vec<PortfolioRule>,
    positions: HashMap<PositionKey, Position>,
    realized_pnl_today: Decimal,
    blocked_symbols: HashSet<String>,
    tripped_breakers: HashSet<String>,
    emergency_stopped: bool,
    emergency_stop_reason: Option<String>,
}

/// The Capital Manager. Generic over the message bus implementation so
/// tests can run it against `message_bus::InMemoryMessageBus` and
/// production wires it to `message_bus::AmqpMessageBus`.
pub struct CapitalManager<B: MessageBus + ?Sized> {
    db: DbRepository,
    bus: Arc<B>,
    ws_tx: broadcast::Sender<WsMessage>,
    risk_params: RiskParameters,
    engine: ValidationRuleEngine,
    state: RwLock<ManagerState>,
}

impl<B: MessageBus + ?Sized + 'static> CapitalManager<B> {
    /// Startup sequence (§4.5): load the active portfolio (fatal if absent),
    /// its active rules, open positions, today's realized P&L since UTC
    /// midnight, then subscribe to the bus.
    pub async fn start(
        risk_params: RiskParameters,
        db: DbRepository,
        bus: Arc<B>,
        ws_tx: broadcast::Sender<WsMessage>,
    ) -> Result<Arc<Self>, RiskError> {
        let portfolio = db
            .get_active_portfolio()
            .await?
            .ok_or(RiskError::PortfolioMissing)?;
        let rules = db.list_active_portfolio_rules(portfolio.portfolio_id).await?;

        let mut positions = HashMap::new();
        for position in db.list_open_positions().await? {
            positions.insert((position.strategy_id, position.symbol.clone()), position);
        }

        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc();
        let realized_pnl_today = db.realized_pnl_since(midnight).await?;

        let blocked_symbols = rules
            .iter()
            .filter(|r| r.is_active)
            .filter_map(|r| match &r.kind {
                PortfolioRuleKind::BlacklistedSymbols(symbols) => Some(symbols.clone()),
                _ => None,
            })
            .flatten()
            .collect();

        let manager = Arc::new(Self {
            db,
            bus,
            ws_tx,
            risk_params,
            engine: ValidationRuleEngine::new(),
            state: RwLock::new(ManagerState {
                portfolio,
                rules,
                positions,
                realized_pnl_today,
                blocked_symbols,
                tripped_breakers: HashSet::new(),
                emergency_stopped: false,
                emergency_stop_reason: None,
            }),
        });

        manager.subscribe_all().await?;
        tracing::info!("capital manager started");
        Ok(manager)
    }

    /// Subscribes to the three topics named in §4.5 step 5. The first two
    /// are both served by the broker's `capital_requests` queue, already
    /// bound to `request.capital.#`; the third needs a private queue since
    /// no centrally-declared queue matches `events.trade_executed`.
    async fn subscribe_all(self: &Arc<Self>) -> Result<(), RiskError> {
        let mgr = Arc::clone(self);
        self.bus
            .subscribe(
                routes::queues::CAPITAL_REQUESTS,
                Arc::new(move |envelope: message_bus::MessageEnvelope| {
                    let mgr = Arc::clone(&mgr);
                    Box::pin(async move { mgr.handle_capital_request(envelope).await })
                }),
                false,
            )
            .await?;

        self.bus
            .declare_and_bind(
                routes::queues::CAPITAL_MANAGER_TRADE_EXECUTED,
                routes::exchanges::EVENTS,
                routes::queues::CAPITAL_MANAGER_TRADE_EXECUTED_PATTERN,
            )
            .await?;

        let mgr = Arc::clone(self);
        self.bus
            .subscribe(
                routes::queues::CAPITAL_MANAGER_TRADE_EXECUTED,
                Arc::new(move |envelope: message_bus::MessageEnvelope| {
                    let mgr = Arc::clone(&mgr);
                    Box::pin(async move { mgr.handle_trade_executed_envelope(envelope).await })
                }),
                false,
            )
            .await?;

        Ok(())
    }

    async fn handle_capital_request(&self, envelope: message_bus::MessageEnvelope) -> message_bus::HandlerResult {
        if envelope.routing_key.starts_with("request.capital.allocation.") {
            let proposal: TradeProposal = envelope.decode()?;
            self.handle_allocation(proposal).await?;
        } else {
            let request: TradeRequest = envelope.decode()?;
            self.handle_ad_hoc_validation(request).await?;
        }
        Ok(())
    }

    async fn handle_trade_executed_envelope(&self, envelope: message_bus::MessageEnvelope) -> message_bus::HandlerResult {
        let execution: TradeExecution = envelope.decode()?;
        self.handle_trade_executed(execution).await?;
        Ok(())
    }

    /// Sizes a strategy's proposal into a concrete request (the proposal
    /// itself always carries a zero/absent quantity; the Capital Manager
    /// decides sizing) and runs it through `validate_trade`. Approved
    /// trades are forwarded to the Exchange Connector as
    /// `commands.execute_trade`; rejections are logged and surfaced as
    /// `events.system.error`.
    async fn handle_allocation(&self, proposal: TradeProposal) -> Result<(), RiskError> {
        let metrics = { self.metrics_snapshot().await };
        let request = self.size_proposal(&proposal, &metrics);
        let response = self.validate_trade(&request).await;

        if response.is_approved() {
            let order = serde_json::json!({
                "strategy_id": proposal.strategy_id,
                "symbol": request.symbol,
                "side": request.side,
                "order_type": request.order_type,
                "quantity": response.approved_quantity,
                "price": request.price,
                "stop_loss": response.suggested_stop_loss,
                "take_profit": response.suggested_take_profit,
            });
            message_bus::publish_json(
                &*self.bus,
                routes::exchanges::COMMANDS,
                routes::routing_keys::COMMANDS_EXECUTE_TRADE,
                &order,
                true,
            )
            .await?;
        } else {
            self.publish_rejection(&proposal.strategy_id, &request.symbol, &response)
                .await?;
        }
        Ok(())
    }

    /// `request.capital.validation`: an already-sized request submitted
    /// directly for a verdict (admin/test tooling). Treated identically to
    /// an approved allocation once validated.
    async fn handle_ad_hoc_validation(&self, request: TradeRequest) -> Result<(), RiskError> {
        let response = self.validate_trade(&request).await;
        if !response.is_approved() {
            self.publish_rejection(&request.strategy_id, &request.symbol, &response)
                .await?;
        }
        Ok(())
    }

    async fn publish_rejection(
        &self,
        strategy_id: &StrategyId,
        symbol: &str,
        response: &ValidationResponse,
    ) -> Result<(), RiskError> {
        tracing::warn!(%strategy_id, symbol, reasons = ?response.reasons, "trade request rejected");
        let payload = serde_json::json!({
            "strategy_id": strategy_id,
            "symbol": symbol,
            "reasons": response.reasons,
        });
        message_bus::publish_json(
            &*self.bus,
            routes::exchanges::EVENTS,
            routes::routing_keys::EVENTS_SYSTEM_ERROR,
            &payload,
            true,
        )
        .await?;
        Ok(())
    }

    /// Baseline position sizing: target notional is the portfolio's risk
    /// cap (`max_position_size_percent` of total value); `validate_trade`'s
    /// `PositionSizeRule` resizes further if other open exposure already
    /// eats into that cap.
    fn size_proposal(&self, proposal: &TradeProposal, metrics: &PortfolioMetrics) -> TradeRequest {
        let target_notional = metrics.total_value * self.risk_params.max_position_size_percent
            / Decimal::ONE_HUNDRED;
        let quantity = if proposal.signal_price.is_zero() {
            Decimal::ZERO
        } else {
            (target_notional / proposal.signal_price).round_dp(8)
        };
        let stop_loss = proposal.stop_loss_price.or_else(|| Some(suggest_stop_loss(
            proposal.signal_price,
            proposal.side,
            self.risk_params.stop_loss_percent,
        )));
        TradeRequest {
            strategy_id: proposal.strategy_id,
            symbol: proposal.symbol.clone(),
            side: proposal.side,
            quantity,
            price: Some(proposal.signal_price),
            stop_loss,
            take_profit: Some(suggest_take_profit(
                proposal.signal_price,
                proposal.side,
                self.risk_params.take_profit_percent,
            )),
            order_type: core_types::OrderType::Market,
            time_in_force: "GTC".to_string(),
            metadata: proposal.strategy_params.clone(),
        }
    }

    /// Runs the full validation chain (§4.5), building a fresh
    /// `ValidationContext` from current state. HIGH/EXTREME approvals are
    /// additionally written to the system log.
    pub async fn validate_trade(&self, request: &TradeRequest) -> ValidationResponse {
        let state = self.state.read().await;

        let metrics = Self::compute_metrics(&state);
        let mut positions_per_symbol: HashMap<String, u32> = HashMap::new();
        for key in state.positions.keys() {
            *positions_per_symbol.entry(key.1.clone()).or_insert(0) += 1;
        }

        let price = request.price.unwrap_or(Decimal::ZERO);
        let notional = request.quantity * price;
        let position_size_percent = if metrics.total_value.is_zero() {
            Decimal::ZERO
        } else {
            (notional / metrics.total_value) * Decimal::ONE_HUNDRED
        };

        // Estimated stop-loss risk (§4.5's validation-context step): the
        // request's own stop-loss if given, otherwise the configured default
        // percentage off the signal price.
        let stop_loss_price = request
            .stop_loss
            .unwrap_or_else(|| suggest_stop_loss(price, request.side, self.risk_params.stop_loss_percent));
        let estimated_risk_amount = request.quantity * (price - stop_loss_price).abs();
        let projected_risk_percent = if metrics.total_value.is_zero() {
            Decimal::ZERO
        } else {
            (estimated_risk_amount / metrics.total_value) * Decimal::ONE_HUNDRED
        };

        let ctx = ValidationContext {
            risk_params: &self.risk_params,
            metrics: &metrics,
            positions_per_symbol: &positions_per_symbol,
            total_positions: state.positions.len() as u32,
            emergency_stopped: state.emergency_stopped,
            emergency_stop_reason: state.emergency_stop_reason.as_deref(),
            tripped_breakers: &state.tripped_breakers,
            blocked_symbols: &state.blocked_symbols,
            notional,
            position_size_percent,
            estimated_risk_amount,
            projected_risk_percent,
        };

        let response = self.engine.validate_all(request, &ctx);
        drop(state);

        if response.is_approved()
            && matches!(response.risk_level, RiskLevel::High | RiskLevel::Extreme)
        {
            let severity = match response.risk_level {
                RiskLevel::Extreme => LogSeverity::Error,
                _ => LogSeverity::Warn,
            };
            let _ = self
                .write_system_log(
                    severity,
                    "capital_manager",
                    format!(
                        "approved {}{} trade at {:?} risk level ({:.2}% of portfolio)",
                        request.symbol, request.side, response.risk_level, response.portfolio_impact
                    ),
                    serde_json::json!({ "strategy_id": request.strategy_id }),
                    Some(request.strategy_id),
                    None,
                )
                .await;
        }

        response
    }

    fn compute_metrics(state: &ManagerState) -> PortfolioMetrics {
        let unrealized_pnl: Decimal = state.positions.values().map(|p| p.unrealized_pnl).sum();
        let total_risk_exposure: Decimal = state
            .positions
            .values()
            .map(|p| p.quantity * p.entry_price)
            .sum();
        let total_value = state.portfolio.total_capital + unrealized_pnl;

        let largest_position_percent = if total_value.is_zero() {
            Decimal::ZERO
        } else {
            state
                .positions
                .values()
                .map(|p| (p.quantity * p.entry_price / total_value) * Decimal::ONE_HUNDRED)
                .fold(Decimal::ZERO, Decimal::max)
        };

        PortfolioMetrics {
            total_value,
            available_cash: state.portfolio.available_capital,
            unrealized_pnl,
            realized_pnl_today: state.realized_pnl_today,
            total_risk_exposure,
            number_of_positions: state.positions.len() as u32,
            largest_position_percent,
            // No market-volatility model is wired in; see DESIGN.md.
            daily_var: Decimal::ZERO,
        }
    }

    async fn metrics_snapshot(&self) -> PortfolioMetrics {
        let state = self.state.read().await;
        Self::compute_metrics(&state)
    }

    /// Trade-executed handler (§4.5): cost-averages the fill into the
    /// position map, rolls realized P&L into today's total, recomputes
    /// exposure, and trips the daily-loss circuit breaker if crossed.
    pub async fn handle_trade_executed(&self, execution: TradeExecution) -> Result<(), RiskError> {
        let (position_after, position_closed, breach) = {
            let mut state = self.state.write().await;
            let key = (execution.strategy_id, execution.symbol.clone());
            let (position_after, closed) = apply_execution(&mut state, &execution);
            let breach = Self::check_daily_loss_breach(&mut state, &self.risk_params);
            if closed {
                state.positions.remove(&key);
            } else if let Some(p) = &position_after {
                state.positions.insert(key, p.clone());
            }
            (position_after, closed, breach)
        };

        if let Some(position) = position_after {
            self.db.upsert_position(&position).await?;
            if position_closed {
                tracing::info!(position_id = %position.position_id, "position closed");
            }
        }

        if let Some(reason) = breach {
            self.trip_circuit_breaker("daily_loss", &reason).await?;
        }

        let _ = self.ws_tx.send(WsMessage::TradeExecuted(core_types::Execution {
            execution_id: Uuid::new_v4(),
            client_order_id: Uuid::new_v4(),
            symbol: execution.symbol,
            side: execution.side,
            price: execution.price,
            quantity: execution.quantity,
            fee: execution.fee,
            fee_asset: String::new(),
            timestamp: execution.timestamp,
        }));

        Ok(())
    }

    fn check_daily_loss_breach(state: &mut ManagerState, risk_params: &RiskParameters) -> Option<String> {
        let metrics = Self::compute_metrics(state);
        if metrics.total_value.is_zero() || state.tripped_breakers.contains("daily_loss") {
            return None;
        }
        let loss_percent = if state.realized_pnl_today < Decimal::ZERO {
            (-state.realized_pnl_today / metrics.total_value) * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        if loss_percent >= risk_params.max_daily_loss_percent {
            state.tripped_breakers.insert("daily_loss".to_string());
            Some(format!(
                "daily realized loss {:.2}% crossed cap {:.2}%",
                loss_percent, risk_params.max_daily_loss_percent
            ))
        } else {
            None
        }
    }

    async fn trip_circuit_breaker(&self, name: &str, reason: &str) -> Result<(), RiskError> {
        tracing::error!(breaker = name, reason, "circuit breaker tripped");
        self.write_system_log(
            LogSeverity::Critical,
            "capital_manager",
            format!("circuit breaker '{name}' tripped: {reason}"),
            serde_json::json!({ "breaker": name }),
            None,
            None,
        )
        .await?;

        let payload = serde_json::json!({ "breaker_name": name, "reason": reason });
        message_bus::publish_json(
            &*self.bus,
            routes::exchanges::EVENTS,
            routes::routing_keys::EVENTS_SYSTEM_ERROR,
            &payload,
            true,
        )
        .await?;

        let _ = self.ws_tx.send(WsMessage::CircuitBreakerTripped(CircuitBreakerTripped {
            timestamp: Utc::now(),
            breaker_name: name.to_string(),
            reason: reason.to_string(),
        }));
        Ok(())
    }

    /// Emergency stop: a one-way latch. Once engaged, every subsequent
    /// `validate_trade` call is rejected via `EmergencyStopRule` until the
    /// process restarts (there is no reset operation by design — see §4.5).
    pub async fn emergency_stop(&self, reason: String) -> Result<(), RiskError> {
        {
            let mut state = self.state.write().await;
            if state.emergency_stopped {
                return Ok(());
            }
            state.emergency_stopped = true;
            state.emergency_stop_reason = Some(reason.clone());
        }

        tracing::error!(reason = %reason, "EMERGENCY STOP engaged");
        self.write_system_log(
            LogSeverity::Critical,
            "capital_manager",
            format!("emergency stop engaged: {reason}"),
            serde_json::json!({}),
            None,
            None,
        )
        .await?;

        let _ = self.ws_tx.send(WsMessage::EmergencyStop(EmergencyStopEngaged {
            timestamp: Utc::now(),
            reason,
        }));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_system_log(
        &self,
        severity: LogSeverity,
        component: &str,
        message: String,
        context: serde_json::Value,
        strategy_id: Option<StrategyId>,
        trade_id: Option<Uuid>,
    ) -> Result<(), RiskError> {
        let log = SystemLog {
            log_id: Uuid::new_v4(),
            severity,
            component: component.to_string(),
            message,
            context,
            strategy_id,
            trade_id,
            timestamp: Utc::now(),
        };
        self.db.insert_system_log(&log).await?;
        Ok(())
    }
}

/// Applies one fill to the position map using cost-averaging on same-side
/// fills and proportional realization on reducing fills. Returns the
/// position's post-fill state (to persist) and whether it closed.
/// Grounded in `executor::Portfolio::update_with_execution`'s averaging
/// arithmetic, generalized from a single in-process ledger to this
/// authoritative one.
fn apply_execution(state: &mut ManagerState, execution: &TradeExecution) -> (Option<Position>, bool) {
    let key = (execution.strategy_id, execution.symbol.clone());
    match state.positions.get(&key) {
        None => {
            if execution.side != OrderSide::Buy {
                tracing::warn!(
                    symbol = %execution.symbol,
                    "sell fill with no open position; spot shorting is unsupported, ignoring"
                );
                return (None, false);
            }
            let position = Position {
                position_id: Uuid::new_v4(),
                strategy_id: execution.strategy_id,
                symbol: execution.symbol.clone(),
                side: PositionSide::Long,
                quantity: execution.quantity,
                entry_price: execution.price,
                unrealized_pnl: Decimal::ZERO,
                realized_pnl: Decimal::ZERO,
                total_fees: execution.fee,
                stop_loss_price: None,
                take_profit_price: None,
                opened_at: execution.timestamp,
                closed_at: None,
            };
            (Some(position), false)
        }
        Some(existing) => {
            let mut position = existing.clone();
            if execution.side == OrderSide::Buy {
                let new_quantity = position.quantity + execution.quantity;
                position.entry_price = ((position.entry_price * position.quantity)
                    + (execution.price * execution.quantity))
                    / new_quantity;
                position.quantity = new_quantity;
                position.total_fees += execution.fee;
                (Some(position), false)
            } else {
                let closing_qty = execution.quantity.min(position.quantity);
                let realized = (execution.price - position.entry_price) * closing_qty - execution.fee;
                position.realized_pnl += realized;
                position.total_fees += execution.fee;
                position.quantity -= closing_qty;
                state.realized_pnl_today += realized;
                let closed = position.quantity.is_zero();
                if closed {
                    position.closed_at = Some(execution.timestamp);
                }
                (Some(position), closed)
            }
        }
    }
}

fn suggest_stop_loss(price: Decimal, side: OrderSide, stop_loss_percent: Decimal) -> Decimal {
    let factor = stop_loss_percent / Decimal::ONE_HUNDRED;
    match side {
        OrderSide::Buy => price * (Decimal::ONE - factor),
        OrderSide::Sell => price * (Decimal::ONE + factor),
    }
}

fn suggest_take_profit(price: Decimal, side: OrderSide, take_profit_percent: Decimal) -> Decimal {
    let factor = take_profit_percent / Decimal::ONE_HUNDRED;
    match side {
        OrderSide::Buy => price * (Decimal::ONE + factor),
        OrderSide::Sell => price * (Decimal::ONE - factor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::OrderType;
    use message_bus::InMemoryMessageBus;
    use rust_decimal_macros::dec;

    // These tests exercise the validation/sizing/trade-executed logic
    // directly against an in-memory state, bypassing `DbRepository` (which
    // needs a live Postgres instance). `CapitalManager::start`'s DB-backed
    // startup sequence is covered by the `database` crate's own tests.

    fn test_manager(risk_params: RiskParameters, portfolio: Portfolio) -> CapitalManager<InMemoryMessageBus> {
        let (ws_tx, _) = broadcast::channel(16);
        // `connect_lazy` builds a pool without touching the network; fine
        // here since these tests never exercise `self.db`.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .expect("lazy pool construction does not connect");
        CapitalManager {
            db: DbRepository::new(pool),
            bus: Arc::new(InMemoryMessageBus::new()),
            ws_tx,
            risk_params,
            engine: ValidationRuleEngine::new(),
            state: RwLock::new(ManagerState {
                portfolio,
                rules: Vec::new(),
                positions: HashMap::new(),
                realized_pnl_today: Decimal::ZERO,
                blocked_symbols: HashSet::new(),
                tripped_breakers: HashSet::new(),
                emergency_stopped: false,
                emergency_stop_reason: None,
            }),
        }
    }

    fn portfolio(total: Decimal) -> Portfolio {
        Portfolio {
            portfolio_id: Uuid::new_v4(),
            name: "main".to_string(),
            base_currency: "USDT".to_string(),
            total_capital: total,
            available_capital: total,
            is_active: true,
        }
    }

    fn request(symbol: &str, quantity: Decimal, price: Decimal) -> TradeRequest {
        TradeRequest {
            strategy_id: StrategyId::new(),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity,
            price: Some(price),
            stop_loss: None,
            take_profit: None,
            order_type: OrderType::Market,
            time_in_force: "GTC".to_string(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn golden_cross_normal_trade_is_approved() {
        let mgr = test_manager(RiskParameters::default(), portfolio(dec!(10000)));
        let response = mgr.validate_trade(&request("BTC/USDT", dec!(0.01), dec!(30000))).await;
        assert!(response.is_approved());
        assert_eq!(response.approved_quantity, dec!(0.01));
    }

    #[tokio::test]
    async fn oversized_proposal_is_resized_to_the_cap() {
        let risk_params = RiskParameters::default(); // max_position_size_percent = 10
        let mgr = test_manager(risk_params, portfolio(dec!(10000)));
        // notional = 1 * 30000 = 30000, which is 300% of portfolio value.
        let response = mgr.validate_trade(&request("BTC/USDT", dec!(1), dec!(30000))).await;
        assert!(response.is_approved());
        assert!(response.approved_quantity < dec!(1));
        // Resized quantity's notional should land near the 10% cap.
        let resized_notional = response.approved_quantity * dec!(30000);
        assert!((resized_notional - dec!(1000)).abs() < dec!(0.01));
    }

    #[tokio::test]
    async fn daily_loss_breach_trips_circuit_breaker_and_rejects_further_trades() {
        let mgr = test_manager(RiskParameters::default(), portfolio(dec!(10000)));

        let execution = TradeExecution {
            strategy_id: StrategyId::new(),
            symbol: "BTC/USDT".to_string(),
            side: OrderSide::Buy,
            quantity: dec!(1),
            price: dec!(100),
            fee: Decimal::ZERO,
            timestamp: Utc::now(),
        };
        {
            let mut state = mgr.state.write().await;
            let (position, _) = apply_execution(&mut state, &execution);
            state.positions.insert(
                (execution.strategy_id, execution.symbol.clone()),
                position.unwrap(),
            );
        }

        // A closing sell at a steep loss: realizes -600 against a 10000
        // portfolio, well past the default 5% daily loss cap.
        let closing_execution = TradeExecution {
            side: OrderSide::Sell,
            price: dec!(40),
            ..execution.clone()
        };
        {
            let mut state = mgr.state.write().await;
            let (position, closed) = apply_execution(&mut state, &closing_execution);
            assert!(closed);
            let _ = position;
            let breach = CapitalManager::<InMemoryMessageBus>::check_daily_loss_breach(
                &mut state,
                &mgr.risk_params,
            );
            assert!(breach.is_some());
        }

        let response = mgr.validate_trade(&request("ETH/USDT", dec!(1), dec!(1000))).await;
        assert!(!response.is_approved());
        assert!(response.reasons.iter().any(|r| r.contains("CircuitBreaker")));
    }
}
