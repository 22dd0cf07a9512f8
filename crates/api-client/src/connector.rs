//! Concrete `ExchangeConnector` for Binance USD-M Futures.
//!
//! Generalizes the teacher's `BinanceClient` (`_get_signed`/`_post_signed`,
//! `fetch_klines`, `place_order`, `get_account_balance`,
//! `get_open_positions`) into the full connector surface, wired through the
//! price cache, circuit breaker, rate limiter, and WebSocket stream manager
//! built alongside it in this crate.

use crate::auth::sign_request;
use crate::cache::{CacheKey, PriceCache};
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::error::ApiError;
use crate::rate_limiter::RateLimiter;
use crate::rounding::{round_price_to_tick_size, round_quantity_to_step_size};
use crate::responses::{
    ApiErrorResponse, BinanceOpenOrder, BinanceOrderBook, BinanceOrderResponse,
};
use crate::websocket::{MarketDataHandler, MarketDataStream};
use crate::{AccountBalance, BookLevel, ConnectorHealth, ExchangeConnector, HealthReport, OrderBook};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use configuration::ExchangeConfig;
use core_types::{Kline, OrderRequest, OrderResponse, OrderSide, OrderType, StrategyId, TradeStatus};
use message_bus::{routes, MessageBus};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Deserialized straight off Binance's `/fapi/v1/klines` array-of-arrays
/// shape; fields are positional, not named.
#[derive(serde::Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

pub struct BinanceConnector {
    http: reqwest::Client,
    rest_base_url: String,
    api_secret: String,
    bus: Option<Arc<dyn MessageBus>>,
    cache: Arc<PriceCache>,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    ws: MarketDataStream,
    connected: AtomicBool,
    cancel: CancellationToken,
}

impl BinanceConnector {
    /// `bus` is optional: a connector used only for REST calls (e.g. in a
    /// `reconcile` CLI run) has no fills to republish and needs no bus
    /// handle.
    pub fn new(config: &ExchangeConfig, bus: Option<Arc<dyn MessageBus>>) -> Self {
        let (rest_base_url, ws_base_url) = if config.sandbox {
            ("https://testnet.binancefuture.com", "wss://stream.binancefuture.com")
        } else {
            ("https://fapi.binance.com", "wss://fstream.binance.com")
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&config.api_key).expect("API key must be a valid header value"),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .expect("the reqwest client's TLS backend is available in every target environment");

        Self {
            http,
            rest_base_url: rest_base_url.to_string(),
            api_secret: config.api_secret.clone(),
            bus,
            cache: Arc::new(PriceCache::new(256, Duration::from_millis(750))),
            breaker: CircuitBreaker::new(5, Duration::from_secs(60)),
            limiter: RateLimiter::new(config.rate_limit_per_minute),
            ws: MarketDataStream::new(Url::parse(ws_base_url).expect("hardcoded WebSocket base URL is valid")),
            connected: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.breaker.guard().await?;
        self.limiter.acquire(&self.cancel).await?;

        let url = format!("{}{}", self.rest_base_url, path);
        let result = self.http.get(&url).query(params).send().await;
        self.finish_request(result).await
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        self.breaker.guard().await?;
        self.limiter.acquire(&self.cancel).await?;

        let url = self.sign_url(path, params)?;
        let result = self.http.get(&url).send().await;
        self.finish_request(result).await
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        self.breaker.guard().await?;
        self.limiter.acquire(&self.cancel).await?;

        let url = self.sign_url(path, params)?;
        let result = self.http.post(&url).send().await;
        self.finish_request(result).await
    }

    async fn delete_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        self.breaker.guard().await?;
        self.limiter.acquire(&self.cancel).await?;

        let url = self.sign_url(path, params)?;
        let result = self.http.delete(&url).send().await;
        self.finish_request(result).await
    }

    fn sign_url(&self, path: &str, params: &mut BTreeMap<&str, String>) -> Result<String, ApiError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the Unix epoch")
            .as_millis();
        params.insert("timestamp", timestamp.to_string());

        let query_string = serde_qs::to_string(params)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let signature = sign_request(&self.api_secret, &query_string);
        Ok(format!("{}{}?{}&signature={}", self.rest_base_url, path, query_string, signature))
    }

    /// Shared tail of every request path: records the outcome against the
    /// circuit breaker, then deserializes the success/error body.
    async fn finish_request<T: DeserializeOwned>(
        &self,
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, ApiError> {
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                self.breaker.record_failure().await;
                return Err(ApiError::RequestBuild(e));
            }
        };

        let status = response.status();
        let text = response.text().await.map_err(ApiError::RequestBuild)?;

        if status.is_success() {
            self.breaker.record_success().await;
            serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()))
        } else {
            self.breaker.record_failure().await;
            match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(err) => Err(ApiError::ExchangeError(err.code, err.msg)),
                Err(_) => Err(ApiError::Deserialization(format!(
                    "unrecognized error body (HTTP {}): {}",
                    status, text
                ))),
            }
        }
    }

    fn binance_symbol(symbol: &str) -> String {
        symbol.to_uppercase().replace('/', "")
    }

    fn parse_order_type(raw: &str) -> Result<OrderType, ApiError> {
        match raw {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            "STOP" | "STOP_MARKET" => Ok(OrderType::StopLoss),
            "TAKE_PROFIT" | "TAKE_PROFIT_MARKET" => Ok(OrderType::TakeProfit),
            other => Err(ApiError::InvalidData(format!("unrecognized order type {}", other))),
        }
    }

    fn map_order_status(status: &str) -> TradeStatus {
        match status {
            "NEW" | "PARTIALLY_FILLED" => TradeStatus::Open,
            "FILLED" => TradeStatus::Closed,
            "CANCELED" | "EXPIRED" => TradeStatus::Canceled,
            "REJECTED" => TradeStatus::Failed,
            _ => TradeStatus::Pending,
        }
    }

    fn into_order_response(raw: BinanceOrderResponse) -> Result<OrderResponse, ApiError> {
        let client_order_id = uuid::Uuid::parse_str(&raw.client_order_id)
            .map_err(|e| ApiError::InvalidData(format!("non-UUID clientOrderId: {}", e)))?;
        let order_type = Self::parse_order_type(&raw.order_type)?;
        Ok(OrderResponse {
            order_id: raw.order_id.to_string(),
            client_order_id,
            symbol: raw.symbol,
            side: raw.side,
            order_type,
            quantity: raw.orig_qty,
            filled: raw.executed_qty,
            remaining: raw.orig_qty - raw.executed_qty,
            status: Self::map_order_status(&raw.status),
            average_price: if raw.avg_price.is_zero() { None } else { Some(raw.avg_price) },
            fee: None,
            timestamp: Utc::now(),
        })
    }

    /// Republishes a fill onto `events.trade_executed` as an ad-hoc JSON
    /// payload shaped like the Capital Manager's `TradeExecution` DTO.
    /// Deliberately not importing that type: this crate stays decoupled
    /// from `capital-manager`, which sits a layer above it.
    async fn publish_fill(&self, strategy_id: StrategyId, order: &OrderResponse) {
        let Some(bus) = &self.bus else { return };
        if order.filled.is_zero() {
            return;
        }

        let payload = serde_json::json!({
            "strategy_id": strategy_id.0,
            "symbol": order.symbol,
            "side": order.side,
            "quantity": order.filled,
            "price": order.average_price.unwrap_or_default(),
            "fee": order.fee.unwrap_or_default(),
            "timestamp": order.timestamp,
        });

        match bus
            .publish(
                routes::exchanges::EVENTS,
                routes::routing_keys::EVENTS_TRADE_EXECUTED,
                payload,
                true,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(order_id = %order.order_id, "fill publish was not confirmed"),
            Err(e) => tracing::error!(error = %e, order_id = %order.order_id, "failed to publish fill"),
        }
    }
}

#[async_trait]
impl ExchangeConnector for BinanceConnector {
    async fn connect(&self) -> Result<(), ApiError> {
        // A lightweight authenticated call doubles as a connectivity and
        // credentials check before the rest of the system starts relying
        // on this connector.
        let mut params = BTreeMap::new();
        let _: Vec<crate::responses::BinanceBalanceResponse> =
            self.get_signed("/fapi/v2/balance", &mut params).await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    async fn get_market_data(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ApiError> {
        let key = CacheKey {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            limit,
        };
        if let Some(bars) = self.cache.get(&key) {
            return Ok(bars);
        }

        let raw: Vec<RawKline> = self
            .get_public(
                "/fapi/v1/klines",
                &[
                    ("symbol", Self::binance_symbol(symbol)),
                    ("interval", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let bars = raw
            .into_iter()
            .map(|r| {
                Ok(Kline {
                    open_time: Utc
                        .timestamp_millis_opt(r.0)
                        .single()
                        .ok_or_else(|| ApiError::InvalidData(format!("invalid open_time {}", r.0)))?,
                    open: Decimal::from_str(&r.1).map_err(|e| ApiError::Deserialization(e.to_string()))?,
                    high: Decimal::from_str(&r.2).map_err(|e| ApiError::Deserialization(e.to_string()))?,
                    low: Decimal::from_str(&r.3).map_err(|e| ApiError::Deserialization(e.to_string()))?,
                    close: Decimal::from_str(&r.4).map_err(|e| ApiError::Deserialization(e.to_string()))?,
                    volume: Decimal::from_str(&r.5).map_err(|e| ApiError::Deserialization(e.to_string()))?,
                    close_time: Utc
                        .timestamp_millis_opt(r.6)
                        .single()
                        .ok_or_else(|| ApiError::InvalidData(format!("invalid close_time {}", r.6)))?,
                    is_closed: true,
                })
            })
            .collect::<Result<Vec<Kline>, ApiError>>()?;

        self.cache.put(key, bars.clone());
        Ok(bars)
    }

    async fn subscribe_market_data(
        &self,
        symbols: &[String],
        timeframe: &str,
        handler: MarketDataHandler,
    ) -> Result<(), ApiError> {
        self.ws.subscribe_klines(
            symbols.to_vec(),
            timeframe.to_string(),
            Arc::clone(&self.cache),
            handler,
            self.cancel.clone(),
        )?;
        Ok(())
    }

    async fn place_order(
        &self,
        order: &OrderRequest,
        strategy_id: StrategyId,
    ) -> Result<OrderResponse, ApiError> {
        order.validate().map_err(ApiError::InvalidRequest)?;

        let side = match order.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order_type = match order.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopLoss => "STOP_MARKET",
            OrderType::TakeProfit => "TAKE_PROFIT_MARKET",
        };

        let binance_symbol = Self::binance_symbol(&order.symbol);
        let quantity = round_quantity_to_step_size(&binance_symbol, order.quantity);

        let mut params = BTreeMap::new();
        params.insert("symbol", binance_symbol.clone());
        params.insert("side", side.to_string());
        params.insert("type", order_type.to_string());
        params.insert("quantity", quantity.to_string());
        params.insert("newClientOrderId", order.client_order_id.to_string());
        if let Some(price) = order.price {
            let price = round_price_to_tick_size(&binance_symbol, price);
            params.insert("price", price.to_string());
            params.insert("timeInForce", "GTC".to_string());
        }

        let raw: BinanceOrderResponse = self.post_signed("/fapi/v1/order", &mut params).await?;
        let response = Self::into_order_response(raw)?;
        self.publish_fill(strategy_id, &response).await;
        Ok(response)
    }

    async fn cancel_order(&self, symbol: &str, client_order_id: &str) -> Result<(), ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", Self::binance_symbol(symbol));
        params.insert("origClientOrderId", client_order_id.to_string());
        let _: BinanceOrderResponse = self.delete_signed("/fapi/v1/order", &mut params).await?;
        Ok(())
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<OrderResponse, ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", Self::binance_symbol(symbol));
        params.insert("origClientOrderId", client_order_id.to_string());
        let raw: BinanceOrderResponse = self.get_signed("/fapi/v1/order", &mut params).await?;
        Self::into_order_response(raw)
    }

    async fn get_account_balance(&self) -> Result<HashMap<String, AccountBalance>, ApiError> {
        let mut params = BTreeMap::new();
        let raw: Vec<crate::responses::BinanceBalanceResponse> =
            self.get_signed("/fapi/v2/balance", &mut params).await?;

        Ok(raw
            .into_iter()
            .map(|b| {
                (
                    b.asset,
                    AccountBalance {
                        free: b.available_balance,
                        used: b.balance - b.available_balance,
                        total: b.balance,
                    },
                )
            })
            .collect())
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderResponse>, ApiError> {
        let mut params = BTreeMap::new();
        if let Some(symbol) = symbol {
            params.insert("symbol", Self::binance_symbol(symbol));
        }
        let raw: Vec<BinanceOpenOrder> = self.get_signed("/fapi/v1/openOrders", &mut params).await?;

        raw.into_iter()
            .map(|o| {
                let client_order_id = uuid::Uuid::parse_str(&o.client_order_id)
                    .map_err(|e| ApiError::InvalidData(format!("non-UUID clientOrderId: {}", e)))?;
                let order_type = Self::parse_order_type(&o.order_type)?;
                Ok(OrderResponse {
                    order_id: o.order_id.to_string(),
                    client_order_id,
                    symbol: o.symbol,
                    side: o.side,
                    order_type,
                    quantity: o.orig_qty,
                    filled: o.executed_qty,
                    remaining: o.orig_qty - o.executed_qty,
                    status: Self::map_order_status(&o.status),
                    average_price: if o.avg_price.is_zero() { None } else { Some(o.avg_price) },
                    fee: None,
                    timestamp: Utc::now(),
                })
            })
            .collect()
    }

    async fn get_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, ApiError> {
        let raw: BinanceOrderBook = self
            .get_public(
                "/fapi/v1/depth",
                &[("symbol", Self::binance_symbol(symbol)), ("limit", depth.to_string())],
            )
            .await?;

        Ok(OrderBook {
            symbol: symbol.to_string(),
            bids: raw.bids.into_iter().map(|l| BookLevel { price: l.0, quantity: l.1 }).collect(),
            asks: raw.asks.into_iter().map(|l| BookLevel { price: l.0, quantity: l.1 }).collect(),
        })
    }

    async fn health_check(&self) -> HealthReport {
        let circuit_state = self.breaker.state().await;
        let state = if !self.connected.load(Ordering::SeqCst) {
            ConnectorHealth::Disconnected
        } else if circuit_state == CircuitState::Open {
            ConnectorHealth::CircuitOpen
        } else {
            ConnectorHealth::Connected
        };
        HealthReport { state, circuit_state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::ExchangeConfig;

    fn test_config() -> ExchangeConfig {
        ExchangeConfig {
            exchange_name: "binance".to_string(),
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
            sandbox: true,
            rate_limit_per_minute: 1200,
            timeout_secs: 5,
        }
    }

    #[test]
    fn binance_symbol_strips_the_slash_and_upcases() {
        assert_eq!(BinanceConnector::binance_symbol("btc/usdt"), "BTCUSDT");
    }

    #[test]
    fn order_status_mapping_covers_the_full_lifecycle() {
        assert_eq!(BinanceConnector::map_order_status("NEW"), TradeStatus::Open);
        assert_eq!(BinanceConnector::map_order_status("PARTIALLY_FILLED"), TradeStatus::Open);
        assert_eq!(BinanceConnector::map_order_status("FILLED"), TradeStatus::Closed);
        assert_eq!(BinanceConnector::map_order_status("CANCELED"), TradeStatus::Canceled);
        assert_eq!(BinanceConnector::map_order_status("REJECTED"), TradeStatus::Failed);
    }

    #[tokio::test]
    async fn health_check_reports_disconnected_before_connect_is_called() {
        let connector = BinanceConnector::new(&test_config(), None);
        let report = connector.health_check().await;
        assert_eq!(report.state, ConnectorHealth::Disconnected);
    }
}
