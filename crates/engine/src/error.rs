use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] configuration::ConfigError),

    #[error("exchange connector error: {0}")]
    Connector(#[from] api_client::ApiError),

    #[error("database error: {0}")]
    Database(#[from] database::DbError),

    #[error("message bus error: {0}")]
    Bus(#[from] message_bus::BusError),

    #[error("capital manager error: {0}")]
    Capital(#[from] capital_manager::RiskError),

    #[error("strategy worker error: {0}")]
    Worker(#[from] strategy_worker::WorkerError),

    #[error("no active portfolio found at startup; create one before starting the engine")]
    PortfolioMissing,

    #[error("startup failed after partial initialization: {0}")]
    StartupFailed(String),

    #[error("engine is already running")]
    AlreadyRunning,
}
