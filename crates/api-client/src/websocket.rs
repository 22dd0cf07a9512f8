//! WebSocket stream manager: one connection per `subscribe_market_data`
//! call, multiplexed in-process via the caller-supplied handler.
//!
//! Directly grounded in the teacher's `api-client/src/live_connector.rs`
//! `subscribe_to_klines` reconnect loop (combined-stream URL, same
//! deserialization shape), generalized with a capped exponential backoff
//! (1s -> 60s, doubling) in place of the teacher's flat 5s retry, and with
//! automatic re-subscription to the same symbol set baked into the loop
//! itself (each reconnect just re-opens the same combined-stream URL).

use crate::cache::PriceCache;
use crate::error::ApiError;
use core_types::Kline;
use futures_util::stream::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;
use chrono::{TimeZone, Utc};

#[derive(Debug, Deserialize)]
struct WsStreamWrapper {
    data: WsKlineEvent,
}

#[derive(Debug, Deserialize)]
struct WsKlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: WsKline,
}

#[derive(Debug, Deserialize)]
struct WsKline {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// A per-tick callback. Invoked once per closed bar, after the shared
/// price cache has already been updated.
pub type MarketDataHandler = Arc<dyn Fn(String, Kline) + Send + Sync>;

pub struct MarketDataStream {
    base_url: Url,
}

impl MarketDataStream {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Spawns the reconnecting stream task; returns immediately. The
    /// returned `CancellationToken` handle (the caller's clone of `cancel`)
    /// stops the loop.
    pub fn subscribe_klines(
        &self,
        symbols: Vec<String>,
        interval: String,
        cache: Arc<PriceCache>,
        handler: MarketDataHandler,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<()>, ApiError> {
        if symbols.is_empty() {
            return Err(ApiError::InvalidRequest("no symbols given to subscribe to".to_string()));
        }

        let streams = symbols
            .iter()
            .map(|s| format!("{}@kline_{}", s.to_lowercase().replace('/', ""), interval))
            .collect::<Vec<_>>()
            .join("/");

        let mut url = self.base_url.clone();
        url.set_path("/stream");
        url.set_query(Some(&format!("streams={}", streams)));

        let handle = tokio::spawn(async move {
            let min_backoff = Duration::from_secs(1);
            let max_backoff = Duration::from_secs(60);
            let mut backoff = min_backoff;

            loop {
                if cancel.is_cancelled() {
                    return;
                }

                tracing::info!(%url, "connecting to market data stream");
                match connect_async(url.clone()).await {
                    Ok((mut stream, _)) => {
                        tracing::info!("market data stream connected");
                        backoff = min_backoff;
                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                msg = stream.next() => {
                                    let Some(msg) = msg else { break };
                                    let Ok(Message::Text(text)) = msg else { continue };
                                    let Ok(wrapper) = serde_json::from_str::<WsStreamWrapper>(&text) else { continue };
                                    if wrapper.data.event_type != "kline" || !wrapper.data.kline.is_closed {
                                        continue;
                                    }
                                    let Some(kline) = parse_kline(&wrapper.data.kline) else { continue };
                                    let symbol = wrapper.data.symbol.clone();
                                    cache.update_latest(&symbol, &interval, kline.clone());
                                    handler(symbol, kline);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "market data stream connection failed");
                    }
                }

                tracing::warn!(?backoff, "market data stream disconnected, reconnecting after backoff");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(max_backoff);
            }
        });

        Ok(handle)
    }
}

fn parse_kline(raw: &WsKline) -> Option<Kline> {
    Some(Kline {
        open_time: Utc.timestamp_millis_opt(raw.open_time).single()?,
        open: Decimal::from_str(&raw.open).ok()?,
        high: Decimal::from_str(&raw.high).ok()?,
        low: Decimal::from_str(&raw.low).ok()?,
        close: Decimal::from_str(&raw.close).ok()?,
        volume: Decimal::from_str(&raw.volume).ok()?,
        close_time: Utc.timestamp_millis_opt(raw.close_time).single()?,
        is_closed: raw.is_closed,
    })
}
