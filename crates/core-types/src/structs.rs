use crate::enums::{OrderSide, OrderType, PositionSide, TradeStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier for a configured strategy instance.
///
/// The source system sometimes treats this as a string, sometimes as an
/// integer. We resolve the ambiguity by using a `Uuid` everywhere: as the
/// primary key, in routing-key suffixes, and in wire payloads (serialized
/// as its string form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(pub Uuid);

impl StrategyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StrategyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for StrategyId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// One time-bucketed OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
    pub is_closed: bool,
}

impl Kline {
    /// A market with a non-positive close is malformed and must never reach a strategy.
    pub fn is_valid(&self) -> bool {
        self.close > Decimal::ZERO && self.open > Decimal::ZERO
    }
}

/// A request to place an order on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub position_side: Option<PositionSide>,
}

impl OrderRequest {
    /// Wire-transmission validation: symbol/side/type present, amount > 0,
    /// limit orders carry a price.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if self.quantity <= Decimal::ZERO {
            return Err(format!("quantity must be positive, got {}", self.quantity));
        }
        if self.order_type == OrderType::Limit && self.price.is_none() {
            return Err("limit orders require a price".to_string());
        }
        Ok(())
    }
}

/// The exchange's response to a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub filled: Decimal,
    pub remaining: Decimal,
    pub status: TradeStatus,
    pub average_price: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// A single confirmed fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: Uuid,
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub fee_asset: String,
    pub timestamp: DateTime<Utc>,
}

/// A strategy's proposal to open or adjust a position. Quantity is always
/// zero here; the Capital Manager determines sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub proposal_id: Uuid,
    pub strategy_id: StrategyId,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: OrderSide,
    pub signal_price: Decimal,
    pub stop_loss_price: Option<Decimal>,
    pub confidence: Decimal,
    pub strategy_params: serde_json::Value,
}

/// Mutable aggregate of a strategy's open holding in one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub strategy_id: StrategyId,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none() && self.quantity > Decimal::ZERO
    }
}

/// The immutable ledger record of an order sent to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub strategy_id: StrategyId,
    pub exchange: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The top-level capital container to which risk rules attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub portfolio_id: Uuid,
    pub name: String,
    pub base_currency: String,
    pub total_capital: Decimal,
    pub available_capital: Decimal,
    pub is_active: bool,
}

impl Portfolio {
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.available_capital < Decimal::ZERO {
            return Err("available_capital must be >= 0".to_string());
        }
        if self.available_capital > self.total_capital {
            return Err("available_capital must be <= total_capital".to_string());
        }
        Ok(())
    }
}

/// A typed risk limit bound to a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum PortfolioRuleKind {
    MaxPositionSizePercent(Decimal),
    MaxDailyLossPercent(Decimal),
    MaxPortfolioExposurePercent(Decimal),
    MinPositionSizeValue(Decimal),
    MaxPositionsPerSymbol(u32),
    BlacklistedSymbols(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRule {
    pub rule_id: Uuid,
    pub portfolio_id: Uuid,
    pub kind: PortfolioRuleKind,
    pub is_active: bool,
}

/// A configured instance of a strategy algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub strategy_id: StrategyId,
    pub name: String,
    pub strategy_type: String,
    pub exchange: String,
    pub symbol: String,
    pub parameters: serde_json::Value,
    pub position_sizing: serde_json::Value,
    pub is_active: bool,
    pub portfolio_id: Uuid,
}

impl Strategy {
    /// `symbol` must match `^[A-Z]{3,10}/[A-Z]{3,10}$`.
    pub fn has_valid_symbol(&self) -> bool {
        let Some((base, quote)) = self.symbol.split_once('/') else {
            return false;
        };
        let valid_part = |s: &str| {
            (3..=10).contains(&s.len()) && s.chars().all(|c| c.is_ascii_uppercase())
        };
        valid_part(base) && valid_part(quote)
    }
}

/// Persistent state of a grid-trading strategy's individual rungs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOrder {
    pub grid_order_id: Uuid,
    pub strategy_id: StrategyId,
    pub grid_level: i32,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub is_filled: bool,
}

/// Append-only named scalar per strategy or portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub metric_id: Uuid,
    pub strategy_id: Option<StrategyId>,
    pub portfolio_id: Option<Uuid>,
    pub name: String,
    pub value: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogSeverity {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

/// Structured event record. Critical events (reconciliation outcomes,
/// emergency stops, risk denials) are written here in addition to any
/// runtime log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLog {
    pub log_id: Uuid,
    pub severity: LogSeverity,
    pub component: String,
    pub message: String,
    pub context: serde_json::Value,
    pub strategy_id: Option<StrategyId>,
    pub trade_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn portfolio(total: Decimal, available: Decimal) -> Portfolio {
        Portfolio {
            portfolio_id: Uuid::new_v4(),
            name: "main".to_string(),
            base_currency: "USDT".to_string(),
            total_capital: total,
            available_capital: available,
            is_active: true,
        }
    }

    #[test]
    fn portfolio_invariant_rejects_available_over_total() {
        assert!(portfolio(dec!(1000), dec!(500)).check_invariants().is_ok());
        assert!(portfolio(dec!(1000), dec!(1001)).check_invariants().is_err());
        assert!(portfolio(dec!(1000), dec!(-1)).check_invariants().is_err());
    }

    #[test]
    fn order_request_rejects_non_positive_quantity() {
        let base = OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: "BTC/USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: dec!(0),
            price: None,
            position_side: None,
        };
        assert!(base.validate().is_err());
        assert!(OrderRequest { quantity: dec!(1), ..base }.validate().is_ok());
    }

    #[test]
    fn limit_order_requires_price() {
        let req = OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: "BTC/USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quantity: dec!(1),
            price: None,
            position_side: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn strategy_symbol_validation() {
        let mk = |symbol: &str| Strategy {
            strategy_id: StrategyId::new(),
            name: "s".to_string(),
            strategy_type: "ma_crossover".to_string(),
            exchange: "binance".to_string(),
            symbol: symbol.to_string(),
            parameters: serde_json::json!({}),
            position_sizing: serde_json::json!({}),
            is_active: true,
            portfolio_id: Uuid::new_v4(),
        };
        assert!(mk("BTC/USDT").has_valid_symbol());
        assert!(!mk("btc/usdt").has_valid_symbol());
        assert!(!mk("BTCUSDT").has_valid_symbol());
        assert!(!mk("B/USDT").has_valid_symbol());
    }

    #[test]
    fn kline_rejects_non_positive_close() {
        let mk = |close: Decimal| Kline {
            open_time: Utc::now(),
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close,
            volume: dec!(1),
            close_time: Utc::now(),
            is_closed: true,
        };
        assert!(mk(dec!(100)).is_valid());
        assert!(!mk(dec!(0)).is_valid());
        assert!(!mk(dec!(-5)).is_valid());
    }
}
