//! The sole supervised task that speaks the exchange's wire protocol,
//! behind a symbol-agnostic `ExchangeConnector` trait.
//!
//! Grounded in the teacher's `api-client` crate (`ApiClient`,
//! `BinanceClient`, `LiveConnector`), generalized from a Binance-Futures-
//! specific shape into the full connector contract below, and supplemented
//! from `original_source/src/exchange_connector/{main,interfaces,
//! websocket_connector}.py` for the circuit breaker, cache, and rate
//! limiter the teacher's crate never had.

use async_trait::async_trait;
use core_types::{Kline, OrderRequest, OrderResponse, StrategyId};
use rust_decimal::Decimal;
use std::collections::HashMap;

mod auth;
pub mod cache;
pub mod circuit_breaker;
pub mod connector;
pub mod error;
pub mod rate_limiter;
pub mod responses;
pub mod rounding;
pub mod websocket;

pub use connector::BinanceConnector;
pub use error::ApiError;
pub use websocket::MarketDataHandler;

/// One currency's balance, as reported by `get_account_balance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountBalance {
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
}

/// One price level on either side of the book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    pub symbol: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorHealth {
    Connected,
    Disconnected,
    CircuitOpen,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub state: ConnectorHealth,
    pub circuit_state: circuit_breaker::CircuitState,
}

/// The symbol-agnostic contract every exchange integration implements.
/// Teacher's `ApiClient` trait idiom, expanded to the full operation set an
/// Exchange Connector needs.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    async fn connect(&self) -> Result<(), ApiError>;
    async fn disconnect(&self);

    async fn get_market_data(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ApiError>;

    /// Opens a reconnecting WebSocket stream for `symbols`; `handler` is
    /// invoked once per closed bar, after the shared price cache has been
    /// refreshed. Returns once the stream task is spawned, not once it
    /// connects.
    async fn subscribe_market_data(
        &self,
        symbols: &[String],
        timeframe: &str,
        handler: MarketDataHandler,
    ) -> Result<(), ApiError>;

    /// Places `order` on behalf of `strategy_id`. On a fill (partial or
    /// full), the connector republishes the execution onto
    /// `events.trade_executed` itself — `OrderRequest` carries no
    /// `strategy_id` of its own, so the caller supplies it here rather than
    /// the connector having to infer it from exchange state.
    async fn place_order(
        &self,
        order: &OrderRequest,
        strategy_id: StrategyId,
    ) -> Result<OrderResponse, ApiError>;

    async fn cancel_order(&self, symbol: &str, client_order_id: &str) -> Result<(), ApiError>;

    async fn get_order_status(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<OrderResponse, ApiError>;

    async fn get_account_balance(&self) -> Result<HashMap<String, AccountBalance>, ApiError>;

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderResponse>, ApiError>;

    async fn get_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, ApiError>;

    async fn health_check(&self) -> HealthReport;
}
