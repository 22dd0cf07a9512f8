use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to build the HTTP request: {0}")]
    RequestBuild(#[from] reqwest::Error),

    #[error("The exchange returned an error: {0} ({1})")]
    ExchangeError(i64, String),

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("Order request failed validation: {0}")]
    InvalidRequest(String),

    #[error("Unknown order id {0}")]
    UnknownOrder(String),

    #[error("Circuit breaker open since {0}")]
    CircuitOpen(chrono::DateTime<chrono::Utc>),

    #[error("Rate limiter refused the request: {0}")]
    RateLimited(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connector is not connected")]
    NotConnected,
}
