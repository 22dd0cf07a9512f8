//! Recent-market-data cache. Collapses repeated strategy/worker reads of
//! the same `(symbol, timeframe, limit)` into one REST call; WebSocket
//! ticks keep the most recent bar fresh between REST refreshes.
//!
//! Shaped after `original_source/src/common/cache_manager.py`'s TTL+key
//! design; `lru` is the crate this Rust codebase reaches for since no
//! teacher crate already carries a cache.

use core_types::Kline;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: String,
    pub timeframe: String,
    pub limit: usize,
}

struct Entry {
    bars: Vec<Kline>,
    cached_at: Instant,
}

/// `ttl` governs how long a REST response is trusted before a fresh fetch
/// is required; the default is short (the docs quote "500ms-2s") since
/// strategies read much more often than the market actually moves.
pub struct PriceCache {
    entries: Mutex<LruCache<CacheKey, Entry>>,
    ttl: Duration,
    latest_ticks: Mutex<HashMap<(String, String), Kline>>,
}

impl PriceCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1"),
            )),
            ttl,
            latest_ticks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a cached response, patching in the latest WebSocket tick for
    /// `(symbol, timeframe)` if one has arrived since the entry was cached.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Kline>> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get(key)?;
        if entry.cached_at.elapsed() > self.ttl {
            return None;
        }
        let mut bars = entry.bars.clone();
        if let Some(latest) = self
            .latest_ticks
            .lock()
            .unwrap()
            .get(&(key.symbol.clone(), key.timeframe.clone()))
        {
            if let Some(last) = bars.last_mut() {
                if latest.open_time >= last.open_time {
                    *last = latest.clone();
                }
            }
        }
        Some(bars)
    }

    pub fn put(&self, key: CacheKey, bars: Vec<Kline>) {
        self.entries.lock().unwrap().put(
            key,
            Entry {
                bars,
                cached_at: Instant::now(),
            },
        );
    }

    /// Called by the WebSocket stream manager on every closed tick.
    /// WebSocket data always wins over whatever REST last returned for the
    /// same key.
    pub fn update_latest(&self, symbol: &str, timeframe: &str, kline: Kline) {
        self.latest_ticks
            .lock()
            .unwrap()
            .insert((symbol.to_string(), timeframe.to_string()), kline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(open_time_offset_secs: i64) -> Kline {
        Kline {
            open_time: Utc::now() + chrono::Duration::seconds(open_time_offset_secs),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: dec!(10),
            close_time: Utc::now() + chrono::Duration::seconds(open_time_offset_secs + 60),
            is_closed: true,
        }
    }

    #[test]
    fn a_fresh_entry_is_returned_before_its_ttl_elapses() {
        let cache = PriceCache::new(8, Duration::from_secs(60));
        let key = CacheKey { symbol: "BTC/USDT".to_string(), timeframe: "1m".to_string(), limit: 2 };
        cache.put(key.clone(), vec![bar(0), bar(60)]);
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn an_expired_entry_is_not_returned() {
        let cache = PriceCache::new(8, Duration::from_millis(1));
        let key = CacheKey { symbol: "BTC/USDT".to_string(), timeframe: "1m".to_string(), limit: 1 };
        cache.put(key.clone(), vec![bar(0)]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn a_websocket_tick_overrides_the_cached_last_bar() {
        let cache = PriceCache::new(8, Duration::from_secs(60));
        let key = CacheKey { symbol: "BTC/USDT".to_string(), timeframe: "1m".to_string(), limit: 1 };
        let mut original = bar(0);
        original.close = dec!(100);
        cache.put(key.clone(), vec![original.clone()]);

        let mut tick = original.clone();
        tick.close = dec!(123.45);
        cache.update_latest("BTC/USDT", "1m", tick);

        let patched = cache.get(&key).unwrap();
        assert_eq!(patched.last().unwrap().close, dec!(123.45));
    }
}
