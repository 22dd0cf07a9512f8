pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{OrderSide, OrderType, PositionSide, StrategyKind, TradeStatus};
pub use error::CoreError;
pub use structs::{
    Execution, GridOrder, Kline, LogSeverity, OrderRequest, OrderResponse, PerformanceMetric,
    Portfolio, PortfolioRule, PortfolioRuleKind, Position, Strategy, StrategyId, SystemLog, Trade,
    TradeProposal,
};