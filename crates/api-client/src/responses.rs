//! Wire DTOs for the exchange's REST responses, kept separate from the
//! symbol-agnostic types (`core_types::OrderResponse`) the `ExchangeConnector`
//! trait exposes. The `Binance*` types here are translated into the public
//! shape in `connector.rs`.

use core_types::OrderSide;
use rust_decimal::Decimal;
use serde::Deserialize;

/// The response from a successful `POST /fapi/v1/order` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrderResponse {
    pub client_order_id: String,
    pub cum_qty: Decimal,
    pub cum_quote: Decimal,
    pub executed_qty: Decimal,
    pub order_id: i64,
    #[serde(default)]
    pub avg_price: Decimal,
    pub orig_qty: Decimal,
    pub price: Decimal,
    pub reduce_only: bool,
    pub side: OrderSide,
    pub status: String,
    pub stop_price: Decimal,
    pub symbol: String,
    pub time_in_force: String,
    #[serde(rename = "type")]
    pub order_type: String,
}

/// A single asset's balance from `GET /fapi/v2/balance`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceBalanceResponse {
    pub account_alias: String,
    pub asset: String,
    pub balance: Decimal,
    pub cross_wallet_balance: Decimal,
    pub cross_un_pnl: Decimal,
    pub available_balance: Decimal,
    pub max_withdraw_amount: Decimal,
}

/// A single open position from `GET /fapi/v2/positionRisk`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePositionResponse {
    pub entry_price: Decimal,
    pub leverage: String, // Comes as a string, e.g., "10"
    pub max_notional_value: String,
    pub liquidation_price: Decimal,
    pub mark_price: Decimal,
    pub position_amt: Decimal,
    pub symbol: String,
    pub un_realized_profit: Decimal,
}

/// A single open order from `GET /fapi/v1/openOrders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOpenOrder {
    pub client_order_id: String,
    pub cum_qty: Decimal,
    pub executed_qty: Decimal,
    pub order_id: i64,
    #[serde(default)]
    pub avg_price: Decimal,
    pub orig_qty: Decimal,
    pub price: Decimal,
    pub side: OrderSide,
    pub status: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: String,
}

/// One `[price, quantity]` level of the order book.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthLevel(pub Decimal, pub Decimal);

/// `GET /fapi/v1/depth` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOrderBook {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: i64,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// An error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i64,
    pub msg: String,
}
