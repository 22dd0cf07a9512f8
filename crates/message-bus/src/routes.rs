//! Centralized exchange, queue, and routing-key constants.
//!
//! Grounded in `message_bus.py`'s `MessageRoutes` class, but using spec.md's
//! bit-stable spellings (underscored `events.trade_executed`) rather than the
//! Python original's dotted `events.trade.executed` where the two differ.

/// Logical topic spaces. All four are declared as durable `topic` exchanges.
pub mod exchanges {
    pub const EVENTS: &str = "events";
    pub const COMMANDS: &str = "commands";
    pub const REQUESTS: &str = "requests";
    pub const DLX: &str = "dlx";
}

/// Durable named queues and the routing-key pattern each is bound with.
pub mod queues {
    pub const MARKET_DATA: &str = "market_data";
    pub const MARKET_DATA_PATTERN: &str = "market_data.*";

    pub const TRADE_COMMANDS: &str = "trade_commands";
    pub const TRADE_COMMANDS_PATTERN: &str = "commands.*";

    pub const CAPITAL_REQUESTS: &str = "capital_requests";
    pub const CAPITAL_REQUESTS_PATTERN: &str = "request.capital.#";

    pub const SYSTEM_EVENTS: &str = "system_events";
    pub const SYSTEM_EVENTS_PATTERN: &str = "events.system.*";

    pub const DEAD_LETTERS: &str = "dead_letters";
    pub const DEAD_LETTERS_PATTERN: &str = "#";

    /// Component-private queue, declared on demand via
    /// `MessageBus::declare_and_bind` rather than at connect time, since
    /// only the Capital Manager consumes it.
    pub const CAPITAL_MANAGER_TRADE_EXECUTED: &str = "capital_manager_trade_executed";
    pub const CAPITAL_MANAGER_TRADE_EXECUTED_PATTERN: &str = "events.trade_executed";
}

/// Bit-stable routing keys, per spec.md §6's "External Interfaces" section.
pub mod routing_keys {
    pub const EVENTS_TRADE_EXECUTED: &str = "events.trade_executed";
    pub const EVENTS_STRATEGY_STARTED: &str = "events.strategy.started";
    pub const EVENTS_STRATEGY_STOPPED: &str = "events.strategy.stopped";
    pub const EVENTS_SYSTEM_ERROR: &str = "events.system.error";
    pub const EVENTS_SYSTEM_HEALTH: &str = "events.system.health";

    pub const COMMANDS_EXECUTE_TRADE: &str = "commands.execute_trade";
    pub const COMMANDS_START_STRATEGY: &str = "commands.start_strategy";
    pub const COMMANDS_STOP_STRATEGY: &str = "commands.stop_strategy";

    pub const REQUEST_CAPITAL_VALIDATION: &str = "request.capital.validation";
    pub const REQUEST_POSITION_STATUS: &str = "request.position.status";

    /// `request.capital.allocation.{strategy_id}` — the strategy-id suffix is
    /// the `Uuid`'s string form, per §9's `StrategyId` decision.
    pub fn capital_allocation(strategy_id: impl std::fmt::Display) -> String {
        format!("request.capital.allocation.{}", strategy_id)
    }

    /// `market_data.{exchange}.{symbol_lower_no_slash}`.
    pub fn market_data(exchange: &str, symbol: &str) -> String {
        format!(
            "market_data.{}.{}",
            exchange,
            symbol.to_lowercase().replace('/', "")
        )
    }
}

/// The default per-queue message TTL (`x-message-ttl`), matching
/// `message_bus.py`'s queue-argument dict.
pub const DEFAULT_MESSAGE_TTL_MS: i64 = 60 * 60 * 1000;

/// Broker prefetch (QoS) applied to every consumer.
pub const DEFAULT_PREFETCH: u16 = 100;
