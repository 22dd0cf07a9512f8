use crate::error::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;

const DEV_JWT_PLACEHOLDER: &str = "dev-secret-change-me";

/// Deployment environment. Production applies stricter startup validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

/// The root configuration structure for the entire application.
///
/// Strategy parameters and risk limits are loaded from `config.toml`
/// (`ma_crossover`, `risk_parameters`, `worker`); connection secrets and
/// the deployment environment are read from the environment, matching the
/// external-interfaces contract.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub message_bus: MessageBusConfig,
    pub exchange: ExchangeConfig,
    pub risk_parameters: RiskParameters,
    pub worker: WorkerConfig,
    pub telegram: TelegramConfig,
    pub ma_crossover: MACrossoverParams,
    pub jwt_secret_key: String,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct MessageBusConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl MessageBusConfig {
    pub fn amqp_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}{}",
            self.user, self.password, self.host, self.port, self.vhost
        )
    }
}

/// Connection parameters for the process that speaks the exchange's wire protocol.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub exchange_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub sandbox: bool,
    pub rate_limit_per_minute: u32,
    pub timeout_secs: u64,
}

/// Risk limits consulted by the Capital Manager's validation rule chain.
///
/// Field-for-field match to the source `RiskParameters` dataclass.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskParameters {
    pub max_position_size_percent: Decimal,
    pub max_positions_per_symbol: u32,
    pub max_total_positions: u32,
    pub max_portfolio_risk_percent: Decimal,
    pub max_daily_loss_percent: Decimal,
    pub max_drawdown_percent: Decimal,
    pub min_trade_amount: Decimal,
    pub max_trade_amount: Decimal,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,
    /// Declared but never consulted by any rule — kept so an operator's
    /// existing config file continues to parse. See DESIGN.md.
    pub max_correlation_exposure: Decimal,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_position_size_percent: dec!(10.0),
            max_positions_per_symbol: 1,
            max_total_positions: 10,
            max_portfolio_risk_percent: dec!(20.0),
            max_daily_loss_percent: dec!(5.0),
            max_drawdown_percent: dec!(15.0),
            min_trade_amount: dec!(10.0),
            max_trade_amount: dec!(10000.0),
            stop_loss_percent: dec!(2.0),
            take_profit_percent: dec!(5.0),
            max_correlation_exposure: dec!(0.0),
        }
    }
}

/// Supervision parameters for a Strategy Worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_memory_mb: f64,
    pub max_cpu_percent: f64,
    pub heartbeat_interval_secs: u64,
    pub max_restart_attempts: u32,
    pub restart_delay_secs: u64,
    pub process_timeout_secs: u64,
    pub enable_auto_restart: bool,
    pub resource_monitoring: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 512.0,
            max_cpu_percent: 80.0,
            heartbeat_interval_secs: 30,
            max_restart_attempts: 3,
            restart_delay_secs: 5,
            process_timeout_secs: 120,
            enable_auto_restart: true,
            resource_monitoring: true,
        }
    }
}

/// Telegram Bot API credentials for the operator-notification sink.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub chat_id: String,
}

/// Parameters for the moving-average crossover strategy.
#[derive(Debug, Deserialize, Clone)]
pub struct MACrossoverParams {
    pub ma_fast_period: usize,
    pub ma_slow_period: usize,
    /// A long-term MA to act as a trend filter.
    pub trend_filter_period: usize,
}

impl Default for MACrossoverParams {
    fn default() -> Self {
        Self {
            ma_fast_period: 10,
            ma_slow_period: 30,
            trend_filter_period: 100,
        }
    }
}

/// TOML-sourced subset: everything that is not a connection secret.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    risk_parameters: RiskParameters,
    worker: WorkerConfig,
    ma_crossover: MACrossoverParams,
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Loads strategy/risk parameters from `config_path` (defaulting to
/// `config.toml`, tolerated as absent) and connection secrets from the
/// environment.
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let path = config_path.unwrap_or("config.toml");
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .build()?;
    let file: FileConfig = builder.try_deserialize().unwrap_or_default();

    let environment = match env_var("ENVIRONMENT").as_deref() {
        Some("production") => Environment::Production,
        _ => Environment::Development,
    };

    let database = DatabaseConfig {
        url: env_var("DATABASE_URL")
            .ok_or_else(|| ConfigError::validation("DATABASE_URL must be set"))?,
    };

    let message_bus = MessageBusConfig {
        host: env_var("RABBITMQ_HOST").unwrap_or_else(|| "localhost".to_string()),
        port: env_var("RABBITMQ_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(5672),
        user: env_var("RABBITMQ_USER").unwrap_or_else(|| "guest".to_string()),
        password: env_var("RABBITMQ_PASSWORD").unwrap_or_else(|| "guest".to_string()),
        vhost: env_var("RABBITMQ_VHOST").unwrap_or_else(|| "/".to_string()),
    };

    let exchange = ExchangeConfig {
        exchange_name: "binance".to_string(),
        api_key: env_var("BINANCE_API_KEY").unwrap_or_default(),
        api_secret: env_var("BINANCE_API_SECRET").unwrap_or_default(),
        sandbox: env_var("BINANCE_TESTNET")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true),
        rate_limit_per_minute: 1200,
        timeout_secs: 30,
    };

    let telegram = TelegramConfig {
        token: env_var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
        chat_id: env_var("TELEGRAM_CHAT_ID").unwrap_or_default(),
    };

    let jwt_secret_key = env_var("JWT_SECRET_KEY").unwrap_or_else(|| DEV_JWT_PLACEHOLDER.to_string());
    let log_level = env_var("RUST_LOG").unwrap_or_else(|| "info".to_string());

    Ok(AppConfig {
        environment,
        database,
        message_bus,
        exchange,
        risk_parameters: file.risk_parameters,
        worker: file.worker,
        telegram,
        ma_crossover: file.ma_crossover,
        jwt_secret_key,
        log_level,
    })
}

impl AppConfig {
    /// Production refuses to start under any of these conditions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment != Environment::Production {
            return Ok(());
        }
        if self.jwt_secret_key == DEV_JWT_PLACEHOLDER {
            return Err(ConfigError::validation(
                "JWT_SECRET_KEY is the development placeholder; set a real secret in production",
            ));
        }
        if self.telegram.token.is_empty() {
            return Err(ConfigError::validation(
                "TELEGRAM_BOT_TOKEN must be set in production",
            ));
        }
        if self.exchange.sandbox {
            return Err(ConfigError::validation(
                "BINANCE_TESTNET (sandbox mode) must be disabled in production",
            ));
        }
        if self.exchange.api_key.is_empty() || self.exchange.api_secret.is_empty() {
            return Err(ConfigError::validation(
                "BINANCE_API_KEY and BINANCE_API_SECRET must be set in production",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            environment: Environment::Production,
            database: DatabaseConfig { url: "postgres://x".to_string() },
            message_bus: MessageBusConfig {
                host: "localhost".to_string(),
                port: 5672,
                user: "guest".to_string(),
                password: "guest".to_string(),
                vhost: "/".to_string(),
            },
            exchange: ExchangeConfig {
                exchange_name: "binance".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
                sandbox: false,
                rate_limit_per_minute: 1200,
                timeout_secs: 30,
            },
            risk_parameters: RiskParameters::default(),
            worker: WorkerConfig::default(),
            telegram: TelegramConfig { token: "t".to_string(), chat_id: "c".to_string() },
            ma_crossover: MACrossoverParams::default(),
            jwt_secret_key: "a-real-secret".to_string(),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn production_rejects_dev_jwt_placeholder() {
        let mut cfg = sample();
        cfg.jwt_secret_key = DEV_JWT_PLACEHOLDER.to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn production_rejects_sandbox_mode() {
        let mut cfg = sample();
        cfg.exchange.sandbox = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn production_rejects_missing_telegram_token() {
        let mut cfg = sample();
        cfg.telegram.token = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn development_skips_strict_validation() {
        let mut cfg = sample();
        cfg.environment = Environment::Development;
        cfg.jwt_secret_key = DEV_JWT_PLACEHOLDER.to_string();
        cfg.exchange.sandbox = true;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn valid_production_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn amqp_url_format() {
        let bus = MessageBusConfig {
            host: "broker".to_string(),
            port: 5672,
            user: "u".to_string(),
            password: "p".to_string(),
            vhost: "/vh".to_string(),
        };
        assert_eq!(bus.amqp_url(), "amqp://u:p@broker:5672/vh");
    }
}
