//! State Reconciliation Engine (§4.6): detects, and where safe repairs,
//! divergence between the system's belief about exchange state and the
//! exchange's own authoritative view.
//!
//! Grounded in the teacher's own `StateReconciler` for the Rust async shape
//! (concurrent balance/position fetch, a ticking `interval` loop), and in
//! `original_source/src/common/state_reconciliation.py` for the exact
//! discrepancy/severity taxonomy and seven-step procedure.

use crate::error::EngineError;
use api_client::ExchangeConnector;
use chrono::{DateTime, Utc};
use core_types::{LogSeverity, StrategyId, SystemLog, TradeStatus};
use database::DbRepository;
use events::{LogLevel, LogMessage, WsMessage};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Relative-variance threshold above which a position discrepancy is
/// raised. `original_source`'s `max_position_variance` default
/// (`Decimal("0.001")`, i.e. 0.1%) is carried as a fixed constant: no
/// existing config struct has a slot for it, and nothing else in this
/// workspace needs it to be operator-tunable yet. See DESIGN.md.
const MAX_POSITION_VARIANCE: Decimal = dec!(0.001);
const BALANCE_VARIANCE_MEDIUM_PERCENT: Decimal = dec!(5.0);
const BALANCE_VARIANCE_HIGH_PERCENT: Decimal = dec!(20.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Matches `state_reconciliation.py::DiscrepancyType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyType {
    MissingPosition,
    ExtraPosition,
    PositionSizeMismatch,
    MissingOrder,
    OrderStatusMismatch,
    BalanceMismatch,
    TradeRecordMissing,
}

#[derive(Debug, Clone, Serialize)]
pub struct Discrepancy {
    pub severity: Severity,
    pub kind: DiscrepancyType,
    pub description: String,
    pub strategy_id: Option<StrategyId>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Completed,
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub discrepancies: Vec<Discrepancy>,
    pub status: ReconciliationStatus,
}

impl ReconciliationReport {
    fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            discrepancies: Vec::new(),
            status: ReconciliationStatus::Completed,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.discrepancies.iter().filter(|d| d.severity == severity).count()
    }

    pub fn has_high_severity(&self) -> bool {
        self.discrepancies.iter().any(|d| d.severity >= Severity::High)
    }

    fn push(&mut self, severity: Severity, kind: DiscrepancyType, description: impl Into<String>) {
        self.discrepancies.push(Discrepancy {
            severity,
            kind,
            description: description.into(),
            strategy_id: None,
            symbol: None,
        });
    }

    fn push_for(
        &mut self,
        severity: Severity,
        kind: DiscrepancyType,
        description: impl Into<String>,
        strategy_id: Option<StrategyId>,
        symbol: Option<String>,
    ) {
        self.discrepancies.push(Discrepancy {
            severity,
            kind,
            description: description.into(),
            strategy_id,
            symbol,
        });
    }
}

/// Runs the full reconciliation procedure against a database, an exchange
/// connector, and a broadcast sink for operator notification.
pub struct StateReconciliationEngine {
    db: DbRepository,
    connector: Arc<dyn ExchangeConnector>,
    ws_tx: broadcast::Sender<WsMessage>,
}

impl StateReconciliationEngine {
    pub fn new(
        db: DbRepository,
        connector: Arc<dyn ExchangeConnector>,
        ws_tx: broadcast::Sender<WsMessage>,
    ) -> Self {
        Self { db, connector, ws_tx }
    }

    /// Runs all seven steps of §4.6 once and persists the resulting report
    /// summary to `SystemLog`. Triggered at Core Engine startup, on the
    /// 5-minute background schedule, and on demand by the `reconcile` CLI
    /// subcommand.
    pub async fn run_once(&self) -> Result<ReconciliationReport, EngineError> {
        let mut report = ReconciliationReport::new();

        self.reconcile_balances(&mut report).await?;
        self.reconcile_positions(&mut report).await?;
        self.reconcile_orders(&mut report).await?;
        self.reconcile_strategy_states(&mut report).await?;
        self.apply_auto_corrections(&mut report);
        self.finalize(&mut report).await?;

        Ok(report)
    }

    /// Runs `run_once` on a repeating `interval`, exiting once `cancel` is
    /// triggered. Mirrors the heartbeat/resource monitor loops in
    /// `strategy-worker::manager`.
    pub fn start(self: Arc<Self>, period: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("state reconciliation loop stopping");
                        return;
                    }
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(report) => tracing::info!(
                                session_id = %report.session_id,
                                status = ?report.status,
                                discrepancies = report.discrepancies.len(),
                                "reconciliation pass complete"
                            ),
                            Err(err) => tracing::error!(error = %err, "reconciliation pass failed"),
                        }
                    }
                }
            }
        })
    }

    /// Step 2: compare each active portfolio's `total_capital` against the
    /// exchange's reported balance in the same base currency.
    async fn reconcile_balances(&self, report: &mut ReconciliationReport) -> Result<(), EngineError> {
        let Some(portfolio) = self.db.get_active_portfolio().await? else {
            return Ok(());
        };
        let balances = self.connector.get_account_balance().await?;
        let Some(balance) = balances.get(&portfolio.base_currency) else {
            report.push(
                Severity::High,
                DiscrepancyType::BalanceMismatch,
                format!(
                    "exchange reports no {} balance at all for the active portfolio",
                    portfolio.base_currency
                ),
            );
            return Ok(());
        };

        if balance.total.is_zero() {
            return Ok(());
        }
        let variance_percent =
            ((portfolio.total_capital - balance.total).abs() / balance.total) * Decimal::ONE_HUNDRED;

        if variance_percent > BALANCE_VARIANCE_HIGH_PERCENT {
            report.push(
                Severity::High,
                DiscrepancyType::BalanceMismatch,
                format!(
                    "portfolio total_capital {} vs exchange balance {} ({:.2}% variance)",
                    portfolio.total_capital, balance.total, variance_percent
                ),
            );
        } else if variance_percent > BALANCE_VARIANCE_MEDIUM_PERCENT {
            report.push(
                Severity::Medium,
                DiscrepancyType::BalanceMismatch,
                format!(
                    "portfolio total_capital {} vs exchange balance {} ({:.2}% variance)",
                    portfolio.total_capital, balance.total, variance_percent
                ),
            );
        }
        Ok(())
    }

    /// Step 3: for every open Position, verify the exchange holds the
    /// expected base-asset amount. There is no dedicated "positions"
    /// endpoint on `ExchangeConnector` in this spot-style domain model, so
    /// the exchange's account balance for the position's base asset
    /// (`symbol` split on `/`) stands in for its reported position size.
    async fn reconcile_positions(&self, report: &mut ReconciliationReport) -> Result<(), EngineError> {
        let positions = self.db.list_open_positions().await?;
        if positions.is_empty() {
            return Ok(());
        }
        let balances = self.connector.get_account_balance().await?;

        for position in positions {
            let Some((base, _quote)) = position.symbol.split_once('/') else {
                continue;
            };
            match balances.get(base) {
                None => {
                    report.push_for(
                        Severity::High,
                        DiscrepancyType::MissingPosition,
                        format!(
                            "open position {} {} has no matching {} balance on the exchange",
                            position.symbol, position.quantity, base
                        ),
                        Some(position.strategy_id),
                        Some(position.symbol.clone()),
                    );
                    continue;
                }
                Some(balance) => {
                    if position.quantity.is_zero() {
                        continue;
                    }
                    let variance = (balance.total - position.quantity).abs() / position.quantity;
                    if variance > MAX_POSITION_VARIANCE {
                        report.push_for(
                            Severity::Medium,
                            DiscrepancyType::PositionSizeMismatch,
                            format!(
                                "position {} expects {} {}, exchange reports {} ({:.4}% variance)",
                                position.symbol,
                                position.quantity,
                                base,
                                balance.total,
                                variance * Decimal::ONE_HUNDRED
                            ),
                            Some(position.strategy_id),
                            Some(position.symbol.clone()),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Step 4: cross-reference DB trades in `pending`/`open` against the
    /// exchange's open orders in both directions.
    async fn reconcile_orders(&self, report: &mut ReconciliationReport) -> Result<(), EngineError> {
        let exchange_orders = self.connector.get_open_orders(None).await?;
        let strategies = self.db.list_active_strategies().await?;

        let mut db_order_ids: HashSet<String> = HashSet::new();
        for strategy in &strategies {
            for trade in self.db.list_trades_for_strategy(strategy.strategy_id).await? {
                let is_open = matches!(trade.status, TradeStatus::Pending | TradeStatus::Open);
                if !is_open {
                    continue;
                }
                let Some(exchange_order_id) = &trade.exchange_order_id else {
                    continue;
                };
                db_order_ids.insert(exchange_order_id.clone());

                if !exchange_orders.iter().any(|o| &o.order_id == exchange_order_id) {
                    report.push_for(
                        Severity::Medium,
                        DiscrepancyType::MissingOrder,
                        format!(
                            "trade {} (exchange order {}) is {:?} in the database but absent from the exchange's open orders",
                            trade.trade_id, exchange_order_id, trade.status
                        ),
                        Some(trade.strategy_id),
                        Some(trade.symbol.clone()),
                    );
                }
            }
        }

        for order in &exchange_orders {
            if !db_order_ids.contains(&order.order_id) {
                report.push(
                    Severity::High,
                    DiscrepancyType::TradeRecordMissing,
                    format!(
                        "exchange order {} ({} {}) has no corresponding trade record",
                        order.order_id, order.symbol, order.side
                    ),
                );
            }
        }
        Ok(())
    }

    /// Step 5: every active strategy must have at least one recorded
    /// performance metric and non-null parameters.
    async fn reconcile_strategy_states(&self, report: &mut ReconciliationReport) -> Result<(), EngineError> {
        for strategy in self.db.list_active_strategies().await? {
            if strategy.parameters.is_null() {
                report.push_for(
                    Severity::Low,
                    DiscrepancyType::OrderStatusMismatch,
                    format!("strategy {} is active with null parameters", strategy.strategy_id),
                    Some(strategy.strategy_id),
                    Some(strategy.symbol.clone()),
                );
            }
            if !self.db.has_performance_metric(strategy.strategy_id).await? {
                report.push_for(
                    Severity::Low,
                    DiscrepancyType::OrderStatusMismatch,
                    format!("strategy {} has no recorded performance metrics", strategy.strategy_id),
                    Some(strategy.strategy_id),
                    Some(strategy.symbol.clone()),
                );
            }
        }
        Ok(())
    }

    /// Step 6: LOW discrepancies are auto-correctable by policy, but the
    /// only remediation currently wired is logging for manual follow-up —
    /// §9's open question leaves further LOW auto-correction unimplemented.
    /// MEDIUM/HIGH/CRITICAL are never auto-corrected; any one of them at
    /// HIGH or above demotes the final status to `Partial`.
    fn apply_auto_corrections(&self, report: &mut ReconciliationReport) {
        for discrepancy in report.discrepancies.iter().filter(|d| d.severity == Severity::Low) {
            tracing::info!(
                kind = ?discrepancy.kind,
                description = %discrepancy.description,
                "auto-correction: logged for manual follow-up (no automatic remediation implemented)"
            );
        }

        report.status = if report.has_high_severity() {
            ReconciliationStatus::Partial
        } else {
            ReconciliationStatus::Completed
        };
    }

    /// Step 7: persist the report summary and notify operators if any
    /// HIGH-or-above discrepancy was found.
    async fn finalize(&self, report: &mut ReconciliationReport) -> Result<(), EngineError> {
        report.finished_at = Some(Utc::now());

        let severity = if report.count(Severity::Critical) > 0 {
            LogSeverity::Critical
        } else if report.has_high_severity() {
            LogSeverity::Error
        } else if report.count(Severity::Medium) > 0 {
            LogSeverity::Warn
        } else {
            LogSeverity::Info
        };

        let log = SystemLog {
            log_id: Uuid::new_v4(),
            severity,
            component: "state_reconciliation".to_string(),
            message: format!(
                "reconciliation session {} completed with status {:?}: {} discrepancies ({} low, {} medium, {} high, {} critical)",
                report.session_id,
                report.status,
                report.discrepancies.len(),
                report.count(Severity::Low),
                report.count(Severity::Medium),
                report.count(Severity::High),
                report.count(Severity::Critical),
            ),
            context: serde_json::to_value(&report.discrepancies).unwrap_or(serde_json::Value::Null),
            strategy_id: None,
            trade_id: None,
            timestamp: report.finished_at.unwrap_or_else(Utc::now),
        };
        self.db.insert_system_log(&log).await?;

        if report.has_high_severity() {
            let _ = self.ws_tx.send(WsMessage::Log(LogMessage {
                timestamp: Utc::now(),
                level: LogLevel::Error,
                message: format!(
                    "reconciliation session {} found {} HIGH-or-above discrepancies",
                    report.session_id,
                    report.count(Severity::High) + report.count(Severity::Critical)
                ),
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_treats_critical_as_the_worst() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn finalize_demotes_status_to_partial_on_multiple_high_discrepancies() {
        let mut report = ReconciliationReport::new();
        report.push(Severity::High, DiscrepancyType::TradeRecordMissing, "first");
        report.push(Severity::High, DiscrepancyType::TradeRecordMissing, "second");

        let has_critical = report.count(Severity::Critical) > 0;
        let any_high = report.count(Severity::High) >= 1;
        report.status = if has_critical || any_high {
            ReconciliationStatus::Partial
        } else {
            ReconciliationStatus::Completed
        };

        assert_eq!(report.status, ReconciliationStatus::Partial);
    }

    #[test]
    fn single_high_discrepancy_demotes_status_to_partial() {
        // §8 scenario 5: a single orphan exchange order (one HIGH
        // trade_record_missing) must still finalize as Partial.
        let mut report = ReconciliationReport::new();
        report.push(Severity::High, DiscrepancyType::BalanceMismatch, "one high");

        let has_critical = report.count(Severity::Critical) > 0;
        let any_high = report.count(Severity::High) >= 1;
        report.status = if has_critical || any_high {
            ReconciliationStatus::Partial
        } else {
            ReconciliationStatus::Completed
        };

        assert_eq!(report.status, ReconciliationStatus::Partial);
        assert!(report.has_high_severity());
    }

    #[test]
    fn quiescent_report_has_no_discrepancies() {
        let report = ReconciliationReport::new();
        assert_eq!(report.discrepancies.len(), 0);
        assert_eq!(report.status, ReconciliationStatus::Completed);
        assert!(!report.has_high_severity());
    }
}
