// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{
    AppConfig, DatabaseConfig, Environment, ExchangeConfig, MACrossoverParams, MessageBusConfig,
    RiskParameters, TelegramConfig, WorkerConfig,
};
pub use settings::load_config;
