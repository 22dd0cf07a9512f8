//! # Strategy Library
//!
//! This crate contains the trading logic layer. It defines a universal
//! `Strategy` trait and provides concrete implementations of it.
//!
//! ## Architectural Principles
//!
//! - **Pure logic crate:** no knowledge of databases, message buses, or
//!   execution. Depends only on `core-types` and `configuration`.
//! - **Strategy-agnostic callers:** the Strategy Worker operates on any
//!   `Box<dyn Strategy>` without knowing its internals.
//! - **Extensibility:** adding a new strategy means a new module, an impl of
//!   `Strategy`, a new `StrategyKind` variant, and a `factory` arm.

pub mod error;
pub mod factory;
pub mod frame;
pub mod ma_crossover;

pub use error::StrategyError;
pub use factory::create_strategy;
pub use frame::OhlcvFrame;
pub use ma_crossover::MACrossover;

pub use core_types::StrategyKind;

use core_types::{Kline, TradeProposal};

/// The core trait every trading strategy implements.
///
/// No method performs I/O: the Strategy Worker owns the message-bus
/// subscription and feeds bars in; the strategy only computes.
pub trait Strategy: Send + Sync {
    /// Pure function over history: recomputes and appends derived indicator
    /// columns onto `frame`, returning the updated frame. MUST tolerate an
    /// empty or short frame during warm-up.
    fn populate_indicators(&self, frame: &OhlcvFrame) -> OhlcvFrame;

    /// Called at most once per incoming closed bar. `frame` has already had
    /// `populate_indicators` applied. Returns a proposal when (and only
    /// when) the strategy's entry/exit conditions are met.
    fn on_data(&mut self, latest: &Kline, frame: &OhlcvFrame) -> Result<Option<TradeProposal>, StrategyError>;

    /// Routing keys (e.g. `market_data.kline.BTC/USDT`) this strategy needs
    /// subscribed before it can run.
    fn get_required_subscriptions(&self) -> Vec<String>;

    /// Called once by the Worker before the first `on_data`. The default
    /// no-op is correct for strategies that rebuild all state from the
    /// frame's history rather than persisting it externally.
    fn on_start(&mut self) {}

    /// Called once by the Worker when the strategy is being stopped.
    fn on_stop(&mut self) {}
}
