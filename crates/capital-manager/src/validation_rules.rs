use crate::interfaces::{PortfolioMetrics, RiskLevel, TradeRequest, ValidationResponse, ValidationResult};
use configuration::RiskParameters;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

/// Everything a `ValidationRule` needs to judge one `TradeRequest`, computed
/// fresh by the `CapitalManager` for each validation pass.
pub struct ValidationContext<'a> {
    pub risk_params: &'a RiskParameters,
    pub metrics: &'a PortfolioMetrics,
    pub positions_per_symbol: &'a HashMap<String, u32>,
    pub total_positions: u32,
    pub emergency_stopped: bool,
    pub emergency_stop_reason: Option<&'a str>,
    pub tripped_breakers: &'a HashSet<String>,
    pub blocked_symbols: &'a HashSet<String>,
    pub notional: Decimal,
    pub position_size_percent: Decimal,
    /// Notional at risk if the stop-loss is hit: `quantity * |price - stop_loss|`,
    /// using the request's stop-loss or a default percentage when absent.
    pub estimated_risk_amount: Decimal,
    /// `estimated_risk_amount` expressed as a percent of portfolio value —
    /// the "projected stop-loss risk" the PortfolioRisk rule adds to current
    /// exposure (§4.5).
    pub projected_risk_percent: Decimal,
}

/// A single rule's verdict. Only `PositionSize` ever resizes; every other
/// rule may only pass or reject outright.
#[derive(Debug, Clone)]
pub enum RuleOutcome {
    Pass,
    Reject(String),
    Resize { approved_quantity: Decimal, reason: String },
}

/// One independent, named, individually enable/disable-able check in the
/// validation chain.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool {
        true
    }
    fn validate(&self, request: &TradeRequest, ctx: &ValidationContext) -> RuleOutcome;
}

pub struct EmergencyStopRule;
impl ValidationRule for EmergencyStopRule {
    fn name(&self) -> &str {
        "EmergencyStop"
    }
    fn validate(&self, _request: &TradeRequest, ctx: &ValidationContext) -> RuleOutcome {
        if ctx.emergency_stopped {
            RuleOutcome::Reject(format!(
                "system halted: {}",
                ctx.emergency_stop_reason.unwrap_or("emergency stop engaged")
            ))
        } else {
            RuleOutcome::Pass
        }
    }
}

pub struct CircuitBreakerRule;
impl ValidationRule for CircuitBreakerRule {
    fn name(&self) -> &str {
        "CircuitBreaker"
    }
    fn validate(&self, _request: &TradeRequest, ctx: &ValidationContext) -> RuleOutcome {
        if ctx.tripped_breakers.is_empty() {
            RuleOutcome::Pass
        } else {
            let names: Vec<&str> = ctx.tripped_breakers.iter().map(String::as_str).collect();
            RuleOutcome::Reject(format!("circuit breaker(s) tripped: {}", names.join(", ")))
        }
    }
}

pub struct BlockedSymbolRule;
impl ValidationRule for BlockedSymbolRule {
    fn name(&self) -> &str {
        "BlockedSymbol"
    }
    fn validate(&self, request: &TradeRequest, ctx: &ValidationContext) -> RuleOutcome {
        if ctx.blocked_symbols.contains(&request.symbol) {
            RuleOutcome::Reject(format!("symbol {} is blocked", request.symbol))
        } else {
            RuleOutcome::Pass
        }
    }
}

pub struct DailyLossLimitRule;
impl ValidationRule for DailyLossLimitRule {
    fn name(&self) -> &str {
        "DailyLossLimit"
    }
    fn validate(&self, _request: &TradeRequest, ctx: &ValidationContext) -> RuleOutcome {
        if ctx.metrics.total_value.is_zero() {
            return RuleOutcome::Pass;
        }
        let realized_loss_percent = if ctx.metrics.realized_pnl_today < Decimal::ZERO {
            (-ctx.metrics.realized_pnl_today / ctx.metrics.total_value) * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        if realized_loss_percent >= ctx.risk_params.max_daily_loss_percent {
            RuleOutcome::Reject(format!(
                "would exceed daily loss cap: {:.2}% >= {:.2}%",
                realized_loss_percent, ctx.risk_params.max_daily_loss_percent
            ))
        } else {
            RuleOutcome::Pass
        }
    }
}

pub struct PositionLimitRule;
impl ValidationRule for PositionLimitRule {
    fn name(&self) -> &str {
        "PositionLimit"
    }
    fn validate(&self, request: &TradeRequest, ctx: &ValidationContext) -> RuleOutcome {
        if ctx.total_positions + 1 > ctx.risk_params.max_total_positions {
            return RuleOutcome::Reject(format!(
                "too many positions: {} + 1 > {}",
                ctx.total_positions, ctx.risk_params.max_total_positions
            ));
        }
        let per_symbol = ctx.positions_per_symbol.get(&request.symbol).copied().unwrap_or(0);
        if per_symbol + 1 > ctx.risk_params.max_positions_per_symbol {
            return RuleOutcome::Reject(format!(
                "too many positions in {}: {} + 1 > {}",
                request.symbol, per_symbol, ctx.risk_params.max_positions_per_symbol
            ));
        }
        RuleOutcome::Pass
    }
}

pub struct TradeSizeRule;
impl ValidationRule for TradeSizeRule {
    fn name(&self) -> &str {
        "TradeSize"
    }
    fn validate(&self, _request: &TradeRequest, ctx: &ValidationContext) -> RuleOutcome {
        if ctx.notional < ctx.risk_params.min_trade_amount {
            RuleOutcome::Reject(format!(
                "trade too small: {} < {}",
                ctx.notional, ctx.risk_params.min_trade_amount
            ))
        } else if ctx.notional > ctx.risk_params.max_trade_amount {
            RuleOutcome::Reject(format!(
                "trade too large: {} > {}",
                ctx.notional, ctx.risk_params.max_trade_amount
            ))
        } else {
            RuleOutcome::Pass
        }
    }
}

pub struct PositionSizeRule;
impl ValidationRule for PositionSizeRule {
    fn name(&self) -> &str {
        "PositionSize"
    }
    fn validate(&self, request: &TradeRequest, ctx: &ValidationContext) -> RuleOutcome {
        if ctx.position_size_percent <= ctx.risk_params.max_position_size_percent {
            return RuleOutcome::Pass;
        }
        if ctx.metrics.total_value.is_zero() || ctx.position_size_percent.is_zero() {
            return RuleOutcome::Reject("position too large".to_string());
        }
        // Scale the requested quantity down so it lands exactly on the cap.
        let scale = ctx.risk_params.max_position_size_percent / ctx.position_size_percent;
        let approved_quantity = (request.quantity * scale).round_dp(8);
        RuleOutcome::Resize {
            approved_quantity,
            reason: format!(
                "position too large ({:.2}% > {:.2}%); resized to fit cap",
                ctx.position_size_percent, ctx.risk_params.max_position_size_percent
            ),
        }
    }
}

pub struct PortfolioRiskRule;
impl ValidationRule for PortfolioRiskRule {
    fn name(&self) -> &str {
        "PortfolioRisk"
    }
    fn validate(&self, _request: &TradeRequest, ctx: &ValidationContext) -> RuleOutcome {
        if ctx.metrics.total_value.is_zero() {
            return RuleOutcome::Pass;
        }
        let current_exposure_percent =
            (ctx.metrics.total_risk_exposure / ctx.metrics.total_value) * Decimal::ONE_HUNDRED;
        let projected_percent = current_exposure_percent + ctx.projected_risk_percent;
        if projected_percent > ctx.risk_params.max_portfolio_risk_percent {
            RuleOutcome::Reject(format!(
                "portfolio risk exceeded: {:.2}% > {:.2}%",
                projected_percent, ctx.risk_params.max_portfolio_risk_percent
            ))
        } else {
            RuleOutcome::Pass
        }
    }
}

/// Runs every rule in the fixed order, aggregating every rejection reason
/// instead of short-circuiting on the first failure.
pub struct ValidationRuleEngine {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ValidationRuleEngine {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(EmergencyStopRule),
                Box::new(CircuitBreakerRule),
                Box::new(BlockedSymbolRule),
                Box::new(DailyLossLimitRule),
                Box::new(PositionLimitRule),
                Box::new(TradeSizeRule),
                Box::new(PositionSizeRule),
                Box::new(PortfolioRiskRule),
            ],
        }
    }

    pub fn validate_all(&self, request: &TradeRequest, ctx: &ValidationContext) -> ValidationResponse {
        let mut reasons = Vec::new();
        let mut resize: Option<(Decimal, String)> = None;
        let mut hard_rejections = 0usize;

        for rule in self.rules.iter().filter(|r| r.is_enabled()) {
            match rule.validate(request, ctx) {
                RuleOutcome::Pass => {}
                RuleOutcome::Reject(reason) => {
                    reasons.push(format!("{}: {}", rule.name(), reason));
                    hard_rejections += 1;
                }
                RuleOutcome::Resize { approved_quantity, reason } => {
                    reasons.push(format!("{}: {}", rule.name(), reason));
                    resize = Some((approved_quantity, reason));
                }
            }
        }

        let risk_level = RiskLevel::classify(ctx.position_size_percent);
        let portfolio_impact = ctx.position_size_percent;

        if hard_rejections == 0 {
            if let Some((approved_quantity, _)) = resize {
                // §4.5: risk level is assessed "post-approval", i.e. against the
                // resized quantity actually going to market, not the originally
                // requested one. `position_size_percent` scales linearly with
                // quantity (notional / total value), so the resized percentage
                // is just the original scaled by how much the quantity shrank.
                let resized_percent = if request.quantity.is_zero() {
                    ctx.position_size_percent
                } else {
                    ctx.position_size_percent * (approved_quantity / request.quantity)
                };
                return ValidationResponse {
                    result: ValidationResult::Approved,
                    approved_quantity,
                    risk_level: RiskLevel::classify(resized_percent),
                    reasons,
                    suggested_stop_loss: request.stop_loss,
                    suggested_take_profit: request.take_profit,
                    estimated_risk_amount: ctx.estimated_risk_amount,
                    portfolio_impact: resized_percent,
                };
            }
            return ValidationResponse {
                result: ValidationResult::Approved,
                approved_quantity: request.quantity,
                risk_level,
                reasons,
                suggested_stop_loss: request.stop_loss,
                suggested_take_profit: request.take_profit,
                estimated_risk_amount: ctx.estimated_risk_amount,
                portfolio_impact,
            };
        }

        ValidationResponse {
            result: ValidationResult::Rejected,
            approved_quantity: Decimal::ZERO,
            risk_level,
            reasons,
            suggested_stop_loss: None,
            suggested_take_profit: None,
            estimated_risk_amount: Decimal::ZERO,
            portfolio_impact,
        }
    }
}

impl Default for ValidationRuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{OrderSide, OrderType};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn request() -> TradeRequest {
        TradeRequest {
            strategy_id: core_types::StrategyId::new(),
            symbol: "BTC/USDT".to_string(),
            side: OrderSide::Buy,
            quantity: dec!(1),
            price: Some(dec!(100)),
            stop_loss: None,
            take_profit: None,
            order_type: OrderType::Market,
            time_in_force: "GTC".to_string(),
            metadata: json!({}),
        }
    }

    fn metrics() -> PortfolioMetrics {
        PortfolioMetrics {
            total_value: dec!(10000),
            available_cash: dec!(9000),
            unrealized_pnl: dec!(0),
            realized_pnl_today: dec!(0),
            total_risk_exposure: dec!(0),
            number_of_positions: 0,
            largest_position_percent: dec!(0),
            daily_var: dec!(0),
        }
    }

    fn context<'a>(
        risk_params: &'a RiskParameters,
        metrics: &'a PortfolioMetrics,
        positions_per_symbol: &'a HashMap<String, u32>,
        blocked: &'a HashSet<String>,
        breakers: &'a HashSet<String>,
    ) -> ValidationContext<'a> {
        ValidationContext {
            risk_params,
            metrics,
            positions_per_symbol,
            total_positions: 0,
            emergency_stopped: false,
            emergency_stop_reason: None,
            tripped_breakers: breakers,
            blocked_symbols: blocked,
            notional: dec!(100),
            position_size_percent: dec!(1),
            estimated_risk_amount: dec!(1),
            projected_risk_percent: dec!(1),
        }
    }

    #[test]
    fn approves_a_clean_small_trade() {
        let risk_params = RiskParameters::default();
        let metrics = metrics();
        let positions = HashMap::new();
        let blocked = HashSet::new();
        let breakers = HashSet::new();
        let ctx = context(&risk_params, &metrics, &positions, &blocked, &breakers);
        let engine = ValidationRuleEngine::new();
        let response = engine.validate_all(&request(), &ctx);
        assert!(response.is_approved());
        assert_eq!(response.approved_quantity, dec!(1));
    }

    #[test]
    fn emergency_stop_rejects_regardless_of_other_rules() {
        let risk_params = RiskParameters::default();
        let metrics = metrics();
        let positions = HashMap::new();
        let blocked = HashSet::new();
        let breakers = HashSet::new();
        let mut ctx = context(&risk_params, &metrics, &positions, &blocked, &breakers);
        ctx.emergency_stopped = true;
        ctx.emergency_stop_reason = Some("manual halt");
        let engine = ValidationRuleEngine::new();
        let response = engine.validate_all(&request(), &ctx);
        assert!(!response.is_approved());
        assert_eq!(response.approved_quantity, dec!(0));
        assert!(response.reasons.iter().any(|r| r.contains("EmergencyStop")));
    }

    #[test]
    fn oversized_position_alone_resizes_instead_of_rejecting() {
        let risk_params = RiskParameters::default(); // max_position_size_percent = 10
        let metrics = metrics();
        let positions = HashMap::new();
        let blocked = HashSet::new();
        let breakers = HashSet::new();
        let mut ctx = context(&risk_params, &metrics, &positions, &blocked, &breakers);
        ctx.position_size_percent = dec!(20); // double the cap
        let engine = ValidationRuleEngine::new();
        let response = engine.validate_all(&request(), &ctx);
        assert!(response.is_approved());
        assert_eq!(response.approved_quantity, dec!(0.5)); // scaled down by 10/20
    }

    #[test]
    fn resize_classifies_risk_level_at_the_capped_size_not_the_requested_one() {
        // §8 scenario 2: a 250%-of-portfolio request against a 5% cap must be
        // resized and classified MEDIUM at the resulting 5% position, not
        // EXTREME at the originally requested 250%.
        let mut risk_params = RiskParameters::default();
        risk_params.max_position_size_percent = dec!(5);
        let metrics = metrics();
        let positions = HashMap::new();
        let blocked = HashSet::new();
        let breakers = HashSet::new();
        let mut ctx = context(&risk_params, &metrics, &positions, &blocked, &breakers);
        ctx.position_size_percent = dec!(250);
        let engine = ValidationRuleEngine::new();
        let response = engine.validate_all(&request(), &ctx);
        assert!(response.is_approved());
        assert_eq!(response.portfolio_impact, dec!(5));
        assert_eq!(response.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn oversized_position_combined_with_another_failure_rejects_fully() {
        let risk_params = RiskParameters::default();
        let metrics = metrics();
        let positions = HashMap::new();
        let mut blocked = HashSet::new();
        blocked.insert("BTC/USDT".to_string());
        let breakers = HashSet::new();
        let mut ctx = context(&risk_params, &metrics, &positions, &blocked, &breakers);
        ctx.position_size_percent = dec!(20);
        let engine = ValidationRuleEngine::new();
        let response = engine.validate_all(&request(), &ctx);
        assert!(!response.is_approved());
        assert_eq!(response.approved_quantity, dec!(0));
    }
}
