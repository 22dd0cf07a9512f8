use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("illegal worker status transition: {from:?} -> {to:?}")]
    IllegalTransition { from: crate::status::WorkerStatus, to: crate::status::WorkerStatus },

    #[error("strategy instantiation failed: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("message bus error: {0}")]
    Bus(#[from] message_bus::BusError),

    #[error("failed to decode message payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no worker registered for strategy {0}")]
    NotFound(core_types::StrategyId),

    #[error("worker for strategy {0} exhausted its restart budget and is crashed")]
    Crashed(core_types::StrategyId),
}
