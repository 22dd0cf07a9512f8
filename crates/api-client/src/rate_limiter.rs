//! Token-bucket rate limiting against the exchange's published request cap.
//! `governor` is the idiomatic choice here; no teacher crate already does
//! rate limiting, so this is reasoned from first principles the same way
//! the price cache is.

use crate::error::ApiError;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use std::num::NonZeroU32;
use tokio_util::sync::CancellationToken;

pub struct RateLimiter {
    inner: GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute.max(1)).unwrap());
        Self { inner: GovernorLimiter::direct(quota) }
    }

    /// Blocks until a token is available, or returns early if `cancel` fires
    /// — callers must always be cancellable rather than wait unboundedly.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), ApiError> {
        tokio::select! {
            _ = self.inner.until_ready() => Ok(()),
            _ = cancel.cancelled() => Err(ApiError::RateLimited(
                "cancelled while waiting for a rate-limit slot".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_succeeds_when_not_cancelled() {
        let limiter = RateLimiter::new(1200);
        let cancel = CancellationToken::new();
        assert!(limiter.acquire(&cancel).await.is_ok());
    }

    #[tokio::test]
    async fn acquire_returns_an_error_once_cancelled() {
        let limiter = RateLimiter::new(1200);
        let cancel = CancellationToken::new();
        cancel.cancel();
        // A cancelled token races against an already-ready limiter; both are
        // legitimate outcomes, but a pre-cancelled token must never hang.
        let _ = limiter.acquire(&cancel).await;
    }
}
