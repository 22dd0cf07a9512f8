use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("not connected to the broker")]
    NotConnected,

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("failed to serialize message envelope: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),
}
