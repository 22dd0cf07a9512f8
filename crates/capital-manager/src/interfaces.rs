use chrono::{DateTime, Utc};
use core_types::{OrderSide, OrderType, StrategyId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Post-approval classification of how much of the portfolio a trade commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl RiskLevel {
    /// Classifies a position-size percentage per the fixed thresholds.
    pub fn classify(position_size_percent: Decimal) -> Self {
        if position_size_percent <= Decimal::new(2, 0) {
            RiskLevel::Low
        } else if position_size_percent <= Decimal::new(5, 0) {
            RiskLevel::Medium
        } else if position_size_percent <= Decimal::new(7, 0) {
            RiskLevel::High
        } else {
            RiskLevel::Extreme
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    Approved,
    Rejected,
    RequiresApproval,
}

/// A strategy's request to commit capital to a trade, submitted to the
/// Capital Manager for validation before it may reach the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub strategy_id: StrategyId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    #[serde(default = "default_time_in_force")]
    pub time_in_force: String,
    #[serde(default)]
    pub metadata: Value,
}

fn default_order_type() -> OrderType {
    OrderType::Market
}

fn default_time_in_force() -> String {
    "GTC".to_string()
}

/// The Capital Manager's verdict on a `TradeRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub result: ValidationResult,
    pub approved_quantity: Decimal,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    pub suggested_stop_loss: Option<Decimal>,
    pub suggested_take_profit: Option<Decimal>,
    #[serde(default)]
    pub estimated_risk_amount: Decimal,
    pub portfolio_impact: Decimal,
}

impl ValidationResponse {
    pub fn is_approved(&self) -> bool {
        self.result == ValidationResult::Approved
    }
}

/// A read-only snapshot of the ledger, computed fresh for each validation
/// pass and for operator-facing broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub total_value: Decimal,
    pub available_cash: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl_today: Decimal,
    pub total_risk_exposure: Decimal,
    pub number_of_positions: u32,
    pub largest_position_percent: Decimal,
    pub daily_var: Decimal,
}

impl PortfolioMetrics {
    pub fn get_used_capital(&self) -> Decimal {
        self.total_value - self.available_cash
    }

    pub fn get_available_capital_percent(&self) -> Decimal {
        if self.total_value.is_zero() {
            return Decimal::ZERO;
        }
        (self.available_cash / self.total_value) * Decimal::ONE_HUNDRED
    }
}

/// A position as seen by the Capital Manager's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_value: Decimal,
}

/// A completed fill reported back to the Capital Manager for ledger update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeExecution {
    pub strategy_id: StrategyId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_classification_thresholds() {
        assert_eq!(RiskLevel::classify(Decimal::new(2, 0)), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(Decimal::new(5, 0)), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(Decimal::new(7, 0)), RiskLevel::High);
        assert_eq!(RiskLevel::classify(Decimal::new(8, 0)), RiskLevel::Extreme);
    }

    #[test]
    fn available_capital_percent_handles_zero_total() {
        let metrics = PortfolioMetrics {
            total_value: Decimal::ZERO,
            available_cash: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl_today: Decimal::ZERO,
            total_risk_exposure: Decimal::ZERO,
            number_of_positions: 0,
            largest_position_percent: Decimal::ZERO,
            daily_var: Decimal::ZERO,
        };
        assert_eq!(metrics.get_available_capital_percent(), Decimal::ZERO);
    }
}
