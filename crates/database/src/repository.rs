use crate::DbError;
use chrono::{DateTime, Utc};
use core_types::{
    GridOrder, LogSeverity, OrderSide, OrderType, Portfolio, PortfolioRule, PortfolioRuleKind,
    Position, PositionSide, Strategy, StrategyId, SystemLog, Trade, TradeStatus,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

/// High-level, application-specific interface to the database. Encapsulates
/// all SQL for the eight persisted entities (§3): Portfolio, PortfolioRule,
/// Strategy, Trade, Position, GridOrder, PerformanceMetric, SystemLog.
///
/// Uses runtime-checked `query_as`/`query` rather than the `query_as!`
/// macro family: the macros need either a live database or cached
/// `.sqlx` metadata at build time, neither of which this workspace can
/// produce without running the toolchain.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

#[derive(FromRow)]
struct PortfolioRow {
    portfolio_id: Uuid,
    name: String,
    base_currency: String,
    total_capital: Decimal,
    available_capital: Decimal,
    is_active: bool,
}

impl From<PortfolioRow> for Portfolio {
    fn from(row: PortfolioRow) -> Self {
        Portfolio {
            portfolio_id: row.portfolio_id,
            name: row.name,
            base_currency: row.base_currency,
            total_capital: row.total_capital,
            available_capital: row.available_capital,
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct PortfolioRuleRow {
    rule_id: Uuid,
    portfolio_id: Uuid,
    kind: String,
    value: serde_json::Value,
    is_active: bool,
}

impl PortfolioRuleRow {
    fn into_domain(self) -> Result<PortfolioRule, DbError> {
        let kind = decode_rule_kind(&self.kind, self.value)?;
        Ok(PortfolioRule {
            rule_id: self.rule_id,
            portfolio_id: self.portfolio_id,
            kind,
            is_active: self.is_active,
        })
    }
}

fn rule_kind_tag(kind: &PortfolioRuleKind) -> (&'static str, serde_json::Value) {
    match kind {
        PortfolioRuleKind::MaxPositionSizePercent(v) => {
            ("max_position_size_percent", serde_json::json!(v))
        }
        PortfolioRuleKind::MaxDailyLossPercent(v) => {
            ("max_daily_loss_percent", serde_json::json!(v))
        }
        PortfolioRuleKind::MaxPortfolioExposurePercent(v) => {
            ("max_portfolio_exposure_percent", serde_json::json!(v))
        }
        PortfolioRuleKind::MinPositionSizeValue(v) => {
            ("min_position_size_value", serde_json::json!(v))
        }
        PortfolioRuleKind::MaxPositionsPerSymbol(v) => {
            ("max_positions_per_symbol", serde_json::json!(v))
        }
        PortfolioRuleKind::BlacklistedSymbols(v) => {
            ("blacklisted_symbols", serde_json::json!(v))
        }
    }
}

fn decode_rule_kind(tag: &str, value: serde_json::Value) -> Result<PortfolioRuleKind, DbError> {
    let kind = match tag {
        "max_position_size_percent" => {
            PortfolioRuleKind::MaxPositionSizePercent(serde_json::from_value(value)?)
        }
        "max_daily_loss_percent" => {
            PortfolioRuleKind::MaxDailyLossPercent(serde_json::from_value(value)?)
        }
        "max_portfolio_exposure_percent" => {
            PortfolioRuleKind::MaxPortfolioExposurePercent(serde_json::from_value(value)?)
        }
        "min_position_size_value" => {
            PortfolioRuleKind::MinPositionSizeValue(serde_json::from_value(value)?)
        }
        "max_positions_per_symbol" => {
            PortfolioRuleKind::MaxPositionsPerSymbol(serde_json::from_value(value)?)
        }
        "blacklisted_symbols" => {
            PortfolioRuleKind::BlacklistedSymbols(serde_json::from_value(value)?)
        }
        other => return Err(DbError::MalformedRow(format!("unknown rule kind `{other}`"))),
    };
    Ok(kind)
}

#[derive(FromRow)]
struct StrategyRow {
    strategy_id: Uuid,
    portfolio_id: Uuid,
    name: String,
    strategy_type: String,
    exchange: String,
    symbol: String,
    parameters: serde_json::Value,
    position_sizing: serde_json::Value,
    is_active: bool,
}

impl From<StrategyRow> for Strategy {
    fn from(row: StrategyRow) -> Self {
        Strategy {
            strategy_id: StrategyId(row.strategy_id),
            name: row.name,
            strategy_type: row.strategy_type,
            exchange: row.exchange,
            symbol: row.symbol,
            parameters: row.parameters,
            position_sizing: row.position_sizing,
            is_active: row.is_active,
            portfolio_id: row.portfolio_id,
        }
    }
}

#[derive(FromRow)]
struct TradeRow {
    trade_id: Uuid,
    strategy_id: Uuid,
    exchange: String,
    exchange_order_id: Option<String>,
    symbol: String,
    side: String,
    order_type: String,
    amount: Decimal,
    price: Option<Decimal>,
    cost: Option<Decimal>,
    fee: Option<Decimal>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TradeRow {
    fn into_domain(self) -> Result<Trade, DbError> {
        Ok(Trade {
            trade_id: self.trade_id,
            strategy_id: StrategyId(self.strategy_id),
            exchange: self.exchange,
            exchange_order_id: self.exchange_order_id,
            symbol: self.symbol,
            side: parse_side(&self.side)?,
            order_type: parse_order_type(&self.order_type)?,
            amount: self.amount,
            price: self.price,
            cost: self.cost,
            fee: self.fee,
            status: parse_trade_status(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PositionRow {
    position_id: Uuid,
    strategy_id: Uuid,
    symbol: String,
    side: String,
    quantity: Decimal,
    entry_price: Decimal,
    unrealized_pnl: Decimal,
    realized_pnl: Decimal,
    total_fees: Decimal,
    stop_loss_price: Option<Decimal>,
    take_profit_price: Option<Decimal>,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl PositionRow {
    fn into_domain(self) -> Result<Position, DbError> {
        Ok(Position {
            position_id: self.position_id,
            strategy_id: StrategyId(self.strategy_id),
            symbol: self.symbol,
            side: parse_position_side(&self.side)?,
            quantity: self.quantity,
            entry_price: self.entry_price,
            unrealized_pnl: self.unrealized_pnl,
            realized_pnl: self.realized_pnl,
            total_fees: self.total_fees,
            stop_loss_price: self.stop_loss_price,
            take_profit_price: self.take_profit_price,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
        })
    }
}

fn parse_side(s: &str) -> Result<OrderSide, DbError> {
    match s {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(DbError::MalformedRow(format!("unknown order side `{other}`"))),
    }
}

fn parse_order_type(s: &str) -> Result<OrderType, DbError> {
    match s {
        "market" => Ok(OrderType::Market),
        "limit" => Ok(OrderType::Limit),
        "stop_loss" => Ok(OrderType::StopLoss),
        "take_profit" => Ok(OrderType::TakeProfit),
        other => Err(DbError::MalformedRow(format!("unknown order type `{other}`"))),
    }
}

fn parse_trade_status(s: &str) -> Result<TradeStatus, DbError> {
    match s {
        "pending" => Ok(TradeStatus::Pending),
        "open" => Ok(TradeStatus::Open),
        "closed" => Ok(TradeStatus::Closed),
        "canceled" => Ok(TradeStatus::Canceled),
        "failed" => Ok(TradeStatus::Failed),
        other => Err(DbError::MalformedRow(format!("unknown trade status `{other}`"))),
    }
}

fn parse_position_side(s: &str) -> Result<PositionSide, DbError> {
    match s {
        "long" => Ok(PositionSide::Long),
        "short" => Ok(PositionSide::Short),
        other => Err(DbError::MalformedRow(format!("unknown position side `{other}`"))),
    }
}

impl DbRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- Portfolio ----------------------------------------------------

    /// The single active portfolio, or `None` if none has been created yet.
    /// The Capital Manager's startup sequence treats the latter as fatal.
    pub async fn get_active_portfolio(&self) -> Result<Option<Portfolio>, DbError> {
        let row = sqlx::query_as::<_, PortfolioRow>(
            "SELECT portfolio_id, name, base_currency, total_capital, available_capital, is_active \
             FROM portfolios WHERE is_active = TRUE ORDER BY portfolio_id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Portfolio::from))
    }

    pub async fn upsert_portfolio(&self, portfolio: &Portfolio) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO portfolios (portfolio_id, name, base_currency, total_capital, available_capital, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (portfolio_id) DO UPDATE SET \
               name = EXCLUDED.name, total_capital = EXCLUDED.total_capital, \
               available_capital = EXCLUDED.available_capital, is_active = EXCLUDED.is_active",
        )
        .bind(portfolio.portfolio_id)
        .bind(&portfolio.name)
        .bind(&portfolio.base_currency)
        .bind(portfolio.total_capital)
        .bind(portfolio.available_capital)
        .bind(portfolio.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- PortfolioRule --------------------------------------------------

    pub async fn list_active_portfolio_rules(
        &self,
        portfolio_id: Uuid,
    ) -> Result<Vec<PortfolioRule>, DbError> {
        let rows = sqlx::query_as::<_, PortfolioRuleRow>(
            "SELECT rule_id, portfolio_id, kind, value, is_active \
             FROM portfolio_rules WHERE portfolio_id = $1 AND is_active = TRUE",
        )
        .bind(portfolio_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PortfolioRuleRow::into_domain).collect()
    }

    pub async fn upsert_portfolio_rule(&self, rule: &PortfolioRule) -> Result<(), DbError> {
        let (tag, value) = rule_kind_tag(&rule.kind);
        sqlx::query(
            "INSERT INTO portfolio_rules (rule_id, portfolio_id, kind, value, is_active) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (rule_id) DO UPDATE SET \
               kind = EXCLUDED.kind, value = EXCLUDED.value, is_active = EXCLUDED.is_active",
        )
        .bind(rule.rule_id)
        .bind(rule.portfolio_id)
        .bind(tag)
        .bind(value)
        .bind(rule.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Strategy -------------------------------------------------------

    pub async fn get_strategy(&self, strategy_id: StrategyId) -> Result<Strategy, DbError> {
        let row = sqlx::query_as::<_, StrategyRow>(
            "SELECT strategy_id, portfolio_id, name, strategy_type, exchange, symbol, \
                    parameters, position_sizing, is_active \
             FROM strategies WHERE strategy_id = $1",
        )
        .bind(strategy_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(row.into())
    }

    pub async fn list_active_strategies(&self) -> Result<Vec<Strategy>, DbError> {
        let rows = sqlx::query_as::<_, StrategyRow>(
            "SELECT strategy_id, portfolio_id, name, strategy_type, exchange, symbol, \
                    parameters, position_sizing, is_active \
             FROM strategies WHERE is_active = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Strategy::from).collect())
    }

    pub async fn upsert_strategy(&self, strategy: &Strategy) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO strategies (strategy_id, portfolio_id, name, strategy_type, exchange, \
                                      symbol, parameters, position_sizing, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (strategy_id) DO UPDATE SET \
               name = EXCLUDED.name, parameters = EXCLUDED.parameters, \
               position_sizing = EXCLUDED.position_sizing, is_active = EXCLUDED.is_active",
        )
        .bind(strategy.strategy_id.0)
        .bind(strategy.portfolio_id)
        .bind(&strategy.name)
        .bind(&strategy.strategy_type)
        .bind(&strategy.exchange)
        .bind(&strategy.symbol)
        .bind(&strategy.parameters)
        .bind(&strategy.position_sizing)
        .bind(strategy.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Trade ----------------------------------------------------------

    pub async fn insert_trade(&self, trade: &Trade) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO trades (trade_id, strategy_id, exchange, exchange_order_id, symbol, \
                                  side, order_type, amount, price, cost, fee, status, \
                                  created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(trade.trade_id)
        .bind(trade.strategy_id.0)
        .bind(&trade.exchange)
        .bind(&trade.exchange_order_id)
        .bind(&trade.symbol)
        .bind(trade.side.to_string())
        .bind(order_type_str(trade.order_type))
        .bind(trade.amount)
        .bind(trade.price)
        .bind(trade.cost)
        .bind(trade.fee)
        .bind(trade_status_str(trade.status))
        .bind(trade.created_at)
        .bind(trade.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_trade_status(
        &self,
        trade_id: Uuid,
        status: TradeStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE trades SET status = $1, updated_at = $2 WHERE trade_id = $3")
            .bind(trade_status_str(status))
            .bind(updated_at)
            .bind(trade_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn list_trades_for_strategy(
        &self,
        strategy_id: StrategyId,
    ) -> Result<Vec<Trade>, DbError> {
        let rows = sqlx::query_as::<_, TradeRow>(
            "SELECT trade_id, strategy_id, exchange, exchange_order_id, symbol, side, \
                    order_type, amount, price, cost, fee, status, created_at, updated_at \
             FROM trades WHERE strategy_id = $1 ORDER BY created_at DESC",
        )
        .bind(strategy_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TradeRow::into_domain).collect()
    }

    // ---- Position ---------------------------------------------------------

    pub async fn list_open_positions(&self) -> Result<Vec<Position>, DbError> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT position_id, strategy_id, symbol, side, quantity, entry_price, \
                    unrealized_pnl, realized_pnl, total_fees, stop_loss_price, \
                    take_profit_price, opened_at, closed_at \
             FROM positions WHERE closed_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PositionRow::into_domain).collect()
    }

    pub async fn get_open_position(
        &self,
        strategy_id: StrategyId,
        symbol: &str,
    ) -> Result<Option<Position>, DbError> {
        let row = sqlx::query_as::<_, PositionRow>(
            "SELECT position_id, strategy_id, symbol, side, quantity, entry_price, \
                    unrealized_pnl, realized_pnl, total_fees, stop_loss_price, \
                    take_profit_price, opened_at, closed_at \
             FROM positions WHERE strategy_id = $1 AND symbol = $2 AND closed_at IS NULL",
        )
        .bind(strategy_id.0)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PositionRow::into_domain).transpose()
    }

    pub async fn upsert_position(&self, position: &Position) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO positions (position_id, strategy_id, symbol, side, quantity, \
                                     entry_price, unrealized_pnl, realized_pnl, total_fees, \
                                     stop_loss_price, take_profit_price, opened_at, closed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (position_id) DO UPDATE SET \
               quantity = EXCLUDED.quantity, entry_price = EXCLUDED.entry_price, \
               unrealized_pnl = EXCLUDED.unrealized_pnl, realized_pnl = EXCLUDED.realized_pnl, \
               total_fees = EXCLUDED.total_fees, stop_loss_price = EXCLUDED.stop_loss_price, \
               take_profit_price = EXCLUDED.take_profit_price, closed_at = EXCLUDED.closed_at",
        )
        .bind(position.position_id)
        .bind(position.strategy_id.0)
        .bind(&position.symbol)
        .bind(position_side_str(position.side))
        .bind(position.quantity)
        .bind(position.entry_price)
        .bind(position.unrealized_pnl)
        .bind(position.realized_pnl)
        .bind(position.total_fees)
        .bind(position.stop_loss_price)
        .bind(position.take_profit_price)
        .bind(position.opened_at)
        .bind(position.closed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Sum of `realized_pnl` for positions closed at or after `since`,
    /// used by the Capital Manager's startup sequence (§4.5 step 4) and
    /// by the daily-loss rule's portfolio-metrics input.
    pub async fn realized_pnl_since(&self, since: DateTime<Utc>) -> Result<Decimal, DbError> {
        let row: (Option<Decimal>,) =
            sqlx::query_as("SELECT SUM(realized_pnl) FROM positions WHERE closed_at >= $1")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0.unwrap_or(Decimal::ZERO))
    }

    // ---- GridOrder ----------------------------------------------------------

    pub async fn list_grid_orders(&self, strategy_id: StrategyId) -> Result<Vec<GridOrder>, DbError> {
        #[derive(FromRow)]
        struct Row {
            grid_order_id: Uuid,
            strategy_id: Uuid,
            grid_level: i32,
            side: String,
            price: Decimal,
            quantity: Decimal,
            is_filled: bool,
        }
        let rows = sqlx::query_as::<_, Row>(
            "SELECT grid_order_id, strategy_id, grid_level, side, price, quantity, is_filled \
             FROM grid_orders WHERE strategy_id = $1 ORDER BY grid_level ASC",
        )
        .bind(strategy_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok(GridOrder {
                    grid_order_id: r.grid_order_id,
                    strategy_id: StrategyId(r.strategy_id),
                    grid_level: r.grid_level,
                    side: parse_side(&r.side)?,
                    price: r.price,
                    quantity: r.quantity,
                    is_filled: r.is_filled,
                })
            })
            .collect()
    }

    pub async fn upsert_grid_order(&self, order: &GridOrder) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO grid_orders (grid_order_id, strategy_id, grid_level, side, price, quantity, is_filled) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (grid_order_id) DO UPDATE SET \
               price = EXCLUDED.price, quantity = EXCLUDED.quantity, is_filled = EXCLUDED.is_filled",
        )
        .bind(order.grid_order_id)
        .bind(order.strategy_id.0)
        .bind(order.grid_level)
        .bind(order.side.to_string())
        .bind(order.price)
        .bind(order.quantity)
        .bind(order.is_filled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- PerformanceMetric ----------------------------------------------------

    pub async fn record_metric(
        &self,
        metric_id: Uuid,
        strategy_id: Option<StrategyId>,
        portfolio_id: Option<Uuid>,
        name: &str,
        value: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO performance_metrics (metric_id, strategy_id, portfolio_id, name, value, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(metric_id)
        .bind(strategy_id.map(|s| s.0))
        .bind(portfolio_id)
        .bind(name)
        .bind(value)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Whether any performance metric has ever been recorded for
    /// `strategy_id`. Used by the State Reconciliation Engine's
    /// strategy-state sanity check.
    pub async fn has_performance_metric(&self, strategy_id: StrategyId) -> Result<bool, DbError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM performance_metrics WHERE strategy_id = $1",
        )
        .bind(strategy_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    // ---- SystemLog ----------------------------------------------------------

    pub async fn insert_system_log(&self, log: &SystemLog) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO system_logs (log_id, severity, component, message, context, \
                                       strategy_id, trade_id, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(log.log_id)
        .bind(severity_str(log.severity))
        .bind(&log.component)
        .bind(&log.message)
        .bind(&log.context)
        .bind(log.strategy_id.map(|s| s.0))
        .bind(log.trade_id)
        .bind(log.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_recent_system_logs(&self, limit: i64) -> Result<Vec<SystemLog>, DbError> {
        #[derive(FromRow)]
        struct Row {
            log_id: Uuid,
            severity: String,
            component: String,
            message: String,
            context: serde_json::Value,
            strategy_id: Option<Uuid>,
            trade_id: Option<Uuid>,
            timestamp: DateTime<Utc>,
        }
        let rows = sqlx::query_as::<_, Row>(
            "SELECT log_id, severity, component, message, context, strategy_id, trade_id, timestamp \
             FROM system_logs ORDER BY timestamp DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok(SystemLog {
                    log_id: r.log_id,
                    severity: parse_severity(&r.severity)?,
                    component: r.component,
                    message: r.message,
                    context: r.context,
                    strategy_id: r.strategy_id.map(StrategyId),
                    trade_id: r.trade_id,
                    timestamp: r.timestamp,
                })
            })
            .collect()
    }
}

fn order_type_str(ot: OrderType) -> &'static str {
    match ot {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
        OrderType::StopLoss => "stop_loss",
        OrderType::TakeProfit => "take_profit",
    }
}

fn trade_status_str(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Pending => "pending",
        TradeStatus::Open => "open",
        TradeStatus::Closed => "closed",
        TradeStatus::Canceled => "canceled",
        TradeStatus::Failed => "failed",
    }
}

fn position_side_str(side: PositionSide) -> &'static str {
    match side {
        PositionSide::Long => "long",
        PositionSide::Short => "short",
    }
}

fn severity_str(severity: LogSeverity) -> &'static str {
    match severity {
        LogSeverity::Debug => "DEBUG",
        LogSeverity::Info => "INFO",
        LogSeverity::Warn => "WARN",
        LogSeverity::Error => "ERROR",
        LogSeverity::Critical => "CRITICAL",
    }
}

fn parse_severity(s: &str) -> Result<LogSeverity, DbError> {
    match s {
        "DEBUG" => Ok(LogSeverity::Debug),
        "INFO" => Ok(LogSeverity::Info),
        "WARN" => Ok(LogSeverity::Warn),
        "ERROR" => Ok(LogSeverity::Error),
        "CRITICAL" => Ok(LogSeverity::Critical),
        other => Err(DbError::MalformedRow(format!("unknown log severity `{other}`"))),
    }
}
