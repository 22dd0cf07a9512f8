use crate::error::StrategyError;
use crate::frame::OhlcvFrame;
use crate::Strategy;
use configuration::MACrossoverParams;
use core_types::{Kline, OrderSide, StrategyId, TradeProposal};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use ta::indicators::SimpleMovingAverage as Sma;
use ta::Next;
use uuid::Uuid;

const FAST_COLUMN: &str = "ma_fast";
const SLOW_COLUMN: &str = "ma_slow";
const TREND_COLUMN: &str = "ma_trend";

/// The illustrative moving-average crossover strategy.
///
/// A buy proposal is emitted when the fast MA crosses above the slow MA
/// while price is above the trend filter; a sell proposal when the fast MA
/// crosses below the slow MA while price is below the trend filter.
pub struct MACrossover {
    strategy_id: StrategyId,
    symbol: String,
    params: MACrossoverParams,
    ma_fast: Sma,
    ma_slow: Sma,
    trend_filter: Sma,
}

impl MACrossover {
    /// Creates a new `MACrossover` instance, validating that the fast period
    /// is strictly shorter than the slow period.
    pub fn new(
        strategy_id: StrategyId,
        params: MACrossoverParams,
        symbol: String,
    ) -> Result<Self, StrategyError> {
        if params.ma_fast_period >= params.ma_slow_period {
            return Err(StrategyError::InvalidParameters(
                "Fast MA period must be less than Slow MA period".to_string(),
            ));
        }

        Ok(Self {
            ma_fast: Sma::new(params.ma_fast_period)
                .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?,
            ma_slow: Sma::new(params.ma_slow_period)
                .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?,
            trend_filter: Sma::new(params.trend_filter_period)
                .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?,
            strategy_id,
            symbol,
            params,
        })
    }

    fn rebuild_indicators(&mut self) {
        self.ma_fast = Sma::new(self.params.ma_fast_period).expect("validated in new()");
        self.ma_slow = Sma::new(self.params.ma_slow_period).expect("validated in new()");
        self.trend_filter = Sma::new(self.params.trend_filter_period).expect("validated in new()");
    }
}

impl Strategy for MACrossover {
    fn populate_indicators(&self, frame: &OhlcvFrame) -> OhlcvFrame {
        // The `ta` crate is stateful and f64-based; we replay the frame's
        // closes through fresh copies of the indicators to keep this call pure.
        let mut fast = Sma::new(self.params.ma_fast_period).expect("validated in new()");
        let mut slow = Sma::new(self.params.ma_slow_period).expect("validated in new()");
        let mut trend = Sma::new(self.params.trend_filter_period).expect("validated in new()");

        let mut out = frame.clone();
        for close in &frame.close {
            let close_f64 = close.to_f64().unwrap_or_default();
            let fast_val = Decimal::from_f64(fast.next(close_f64)).unwrap_or(Decimal::ZERO);
            let slow_val = Decimal::from_f64(slow.next(close_f64)).unwrap_or(Decimal::ZERO);
            let trend_val = Decimal::from_f64(trend.next(close_f64)).unwrap_or(Decimal::ZERO);
            out.push_indicator(FAST_COLUMN, fast_val);
            out.push_indicator(SLOW_COLUMN, slow_val);
            out.push_indicator(TREND_COLUMN, trend_val);
        }
        out
    }

    fn on_data(
        &mut self,
        latest: &Kline,
        frame: &OhlcvFrame,
    ) -> Result<Option<TradeProposal>, StrategyError> {
        let close_f64 = latest.close.to_f64().unwrap_or_default();
        let current_fast = Decimal::from_f64(self.ma_fast.next(close_f64)).unwrap_or(Decimal::ZERO);
        let current_slow = Decimal::from_f64(self.ma_slow.next(close_f64)).unwrap_or(Decimal::ZERO);
        let trend = Decimal::from_f64(self.trend_filter.next(close_f64)).unwrap_or(Decimal::ZERO);

        let (prev_fast, prev_slow) = match (
            frame.last_indicator(FAST_COLUMN),
            frame.last_indicator(SLOW_COLUMN),
        ) {
            (Some(f), Some(s)) => (f, s),
            _ => return Ok(None), // still warming up
        };

        let is_bullish_cross = prev_fast <= prev_slow && current_fast > current_slow;
        let is_bearish_cross = prev_fast >= prev_slow && current_fast < current_slow;
        let is_uptrend = latest.close > trend;
        let is_downtrend = latest.close < trend;

        let side = if is_bullish_cross && is_uptrend {
            OrderSide::Buy
        } else if is_bearish_cross && is_downtrend {
            OrderSide::Sell
        } else {
            return Ok(None);
        };

        Ok(Some(TradeProposal {
            proposal_id: Uuid::new_v4(),
            strategy_id: self.strategy_id,
            timestamp: latest.close_time,
            symbol: self.symbol.clone(),
            side,
            signal_price: latest.close,
            stop_loss_price: None,
            confidence: dec!(1.0),
            strategy_params: serde_json::json!({
                "ma_fast_period": self.params.ma_fast_period,
                "ma_slow_period": self.params.ma_slow_period,
                "trend_filter_period": self.params.trend_filter_period,
            }),
        }))
    }

    fn get_required_subscriptions(&self) -> Vec<String> {
        vec![format!("market_data.kline.{}", self.symbol)]
    }

    fn on_start(&mut self) {
        // Indicator state is cheap to recompute from history; we never
        // persist it, so a fresh start just resets the live indicators.
        self.rebuild_indicators();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn params() -> MACrossoverParams {
        MACrossoverParams {
            ma_fast_period: 2,
            ma_slow_period: 4,
            trend_filter_period: 2,
        }
    }

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
    fn rejects_fast_period_not_shorter_than_slow() {
        let bad = MACrossoverParams { ma_fast_period: 10, ma_slow_period: 10, trend_filter_period: 5 };
        assert!(MACrossover::new(StrategyId::new(), bad, "BTC/USDT".to_string()).is_err());
    }

    #[test]
    fn required_subscription_matches_symbol() {
        let strat = MACrossover::new(StrategyId::new(), params(), "BTC/USDT".to_string()).unwrap();
        assert_eq!(
            strat.get_required_subscriptions(),
            vec!["market_data.kline.BTC/USDT".to_string()]
        );
    }

    #[test]
    fn warm_up_period_emits_no_proposal() {
        let mut strat = MACrossover::new(StrategyId::new(), params(), "BTC/USDT".to_string()).unwrap();
        let frame = OhlcvFrame::new();
        let result = strat.on_data(&bar(dec!(100)), &frame).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn bullish_crossover_above_trend_emits_buy() {
        let mut strat = MACrossover::new(StrategyId::new(), params(), "BTC/USDT".to_string()).unwrap();
        let mut frame = OhlcvFrame::new();
        for close in [dec!(100), dec!(99), dec!(98), dec!(97)] {
            let proposal = strat.on_data(&bar(close), &frame).unwrap();
            assert!(proposal.is_none());
            frame = strat.populate_indicators(&{
                let mut f = frame.clone();
                f.push_bar(&bar(close));
                f
            });
        }
        // A sharp rally should eventually cross the fast MA back above the slow MA.
        let mut saw_buy = false;
        for close in [dec!(105), dec!(110), dec!(115), dec!(120)] {
            if let Some(proposal) = strat.on_data(&bar(close), &frame).unwrap() {
                assert_eq!(proposal.side, OrderSide::Buy);
                saw_buy = true;
                break;
            }
            frame = strat.populate_indicators(&{
                let mut f = frame.clone();
                f.push_bar(&bar(close));
                f
            });
        }
        assert!(saw_buy, "expected a bullish crossover after a sustained rally");
    }
}
