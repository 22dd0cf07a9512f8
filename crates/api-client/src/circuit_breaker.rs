//! Per-connector circuit breaker: trips after a run of consecutive failures,
//! stays open for a timeout, then allows one probing call through before
//! fully closing again.
//!
//! Generalizes the teacher's `engine::risk_manager::GlobalRiskManager` halt
//! flag (`Arc<Mutex<HashMap<String, bool>>>`, flipped back by a
//! `tokio::spawn`ed cooldown timer) from a per-bot boolean into a three-state
//! `CircuitState`, and from a spawned timer into an elapsed-time check on
//! the next call — equivalent behavior without needing a background task.

use crate::error::ApiError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    open_timeout: chrono::Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold,
            open_timeout: chrono::Duration::from_std(open_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
        }
    }

    /// Call before issuing a request. `HalfOpen` lets exactly the caller
    /// that observes the timeout elapsed through; every other caller still
    /// sees `Open` until that probe resolves via `record_success`/`record_failure`.
    pub async fn guard(&self) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let since = inner.opened_at.expect("opened_at set when entering Open");
                if Utc::now() - since >= self.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("circuit breaker half-open, allowing a probe request");
                    Ok(())
                } else {
                    Err(ApiError::CircuitOpen(since))
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != CircuitState::Closed {
            tracing::info!("circuit breaker closed after a successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::HalfOpen => {
                tracing::warn!("circuit breaker probe failed, reopening");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Utc::now());
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker tripped"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Utc::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trips_after_the_threshold_and_rejects_while_open() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(300));
        for _ in 0..2 {
            breaker.record_failure().await;
            assert!(breaker.guard().await.is_ok());
        }
        breaker.record_failure().await;
        assert!(matches!(breaker.guard().await, Err(ApiError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn half_opens_after_the_timeout_and_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(breaker.guard().await.is_ok());
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }
}
