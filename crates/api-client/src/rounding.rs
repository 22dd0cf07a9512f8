//! Tick-size/step-size rounding before an order reaches the exchange.
//!
//! Carried over from the teacher's `executor::exchange` module
//! (`round_price_to_tick_size`/`round_quantity_to_step_size`), unchanged in
//! shape: Binance Futures publishes exact tick/step sizes per symbol via
//! `/fapi/v1/exchangeInfo`, but the teacher's crate never fetched that
//! endpoint either, so this keeps the same small hardcoded table rather
//! than inventing exchange-info plumbing the original never had.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub fn round_price_to_tick_size(symbol: &str, price: Decimal) -> Decimal {
    let tick_size = match symbol {
        "BTCUSDT" => dec!(0.1),
        "ETHUSDT" => dec!(0.01),
        _ => dec!(0.01),
    };
    (price / tick_size).round() * tick_size
}

pub fn round_quantity_to_step_size(symbol: &str, quantity: Decimal) -> Decimal {
    let step_size = match symbol {
        "BTCUSDT" => dec!(0.001),
        "ETHUSDT" => dec!(0.001),
        _ => dec!(0.001),
    };
    let rounded = (quantity / step_size).floor() * step_size;
    if quantity > Decimal::ZERO && rounded == Decimal::ZERO {
        step_size
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_rounds_to_the_symbols_tick_size() {
        assert_eq!(round_price_to_tick_size("BTCUSDT", dec!(50000.37)), dec!(50000.4));
        assert_eq!(round_price_to_tick_size("ETHUSDT", dec!(2500.126)), dec!(2500.13));
    }

    #[test]
    fn quantity_rounds_down_to_the_symbols_step_size_but_never_to_zero() {
        assert_eq!(round_quantity_to_step_size("BTCUSDT", dec!(0.0019)), dec!(0.001));
        assert_eq!(round_quantity_to_step_size("BTCUSDT", dec!(0.0001)), dec!(0.001));
        assert_eq!(round_quantity_to_step_size("BTCUSDT", dec!(0)), dec!(0));
    }
}
