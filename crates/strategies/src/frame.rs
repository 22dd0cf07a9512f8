use chrono::{DateTime, Utc};
use core_types::Kline;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A column-oriented rolling window of OHLCV history plus derived indicator
/// columns, generalizing the teacher's bar-at-a-time scalar state into the
/// frame a `Strategy::populate_indicators` can operate over in one pure call.
///
/// Indicator columns are keyed by name so a strategy can add as many as it
/// needs without widening this struct. A missing value at an index (the
/// indicator's warm-up period) is represented by the column simply being
/// shorter than `len()`; callers index from the end.
#[derive(Debug, Clone, Default)]
pub struct OhlcvFrame {
    pub timestamps: Vec<DateTime<Utc>>,
    pub open: Vec<Decimal>,
    pub high: Vec<Decimal>,
    pub low: Vec<Decimal>,
    pub close: Vec<Decimal>,
    pub volume: Vec<Decimal>,
    indicators: HashMap<String, Vec<Decimal>>,
}

impl OhlcvFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Appends one closed bar to the frame.
    pub fn push_bar(&mut self, kline: &Kline) {
        self.timestamps.push(kline.close_time);
        self.open.push(kline.open);
        self.high.push(kline.high);
        self.low.push(kline.low);
        self.close.push(kline.close);
        self.volume.push(kline.volume);
    }

    /// The most recent value of the named indicator column, if it has warmed up.
    pub fn last_indicator(&self, name: &str) -> Option<Decimal> {
        self.indicators.get(name).and_then(|col| col.last().copied())
    }

    /// The second-most-recent value of the named indicator column.
    pub fn prev_indicator(&self, name: &str) -> Option<Decimal> {
        self.indicators
            .get(name)
            .and_then(|col| col.len().checked_sub(2).and_then(|i| col.get(i)))
            .copied()
    }

    /// Appends one value to the named indicator column, creating it if absent.
    pub fn push_indicator(&mut self, name: &str, value: Decimal) {
        self.indicators
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.close.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(close: Decimal) -> Kline {
        Kline {
            open_time: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            close_time: Utc::now(),
            is_closed: true,
        }
    }

    #[test]
    fn frame_starts_empty() {
        let frame = OhlcvFrame::new();
        assert!(frame.is_empty());
        assert_eq!(frame.last_close(), None);
    }

    #[test]
    fn push_bar_grows_all_columns_together() {
        let mut frame = OhlcvFrame::new();
        frame.push_bar(&bar(dec!(100)));
        frame.push_bar(&bar(dec!(101)));
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.last_close(), Some(dec!(101)));
    }

    #[test]
    fn indicator_columns_track_prev_and_last() {
        let mut frame = OhlcvFrame::new();
        frame.push_indicator("sma_fast", dec!(10));
        assert_eq!(frame.last_indicator("sma_fast"), Some(dec!(10)));
        assert_eq!(frame.prev_indicator("sma_fast"), None);
        frame.push_indicator("sma_fast", dec!(11));
        assert_eq!(frame.last_indicator("sma_fast"), Some(dec!(11)));
        assert_eq!(frame.prev_indicator("sma_fast"), Some(dec!(10)));
    }

    #[test]
    fn missing_indicator_column_returns_none() {
        let frame = OhlcvFrame::new();
        assert_eq!(frame.last_indicator("nonexistent"), None);
    }
}
