//! Request pacing backed by a `governor` GCRA limiter.

use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota};

/// Admits at most `max_requests` per `window`. A limit of zero disables pacing.
pub struct RateLimiter {
    max_requests: u32,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let limiter = NonZeroU32::new(max_requests).and_then(|burst| {
            Quota::with_period(window / max_requests)
                .map(|quota| governor::RateLimiter::direct(quota.allow_burst(burst)))
        });
        Self {
            max_requests,
            limiter,
        }
    }

    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            limiter: NonZeroU32::new(max_requests)
                .map(|n| governor::RateLimiter::direct(Quota::per_minute(n))),
        }
    }

    /// Wait until a request slot is free, then claim it.
    pub async fn acquire(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        if limiter.check().is_err() {
            tracing::debug!(
                max_requests = self.max_requests,
                "rate limit reached, waiting"
            );
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn admits_burst_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn waits_once_the_burst_is_spent() {
        let limiter = RateLimiter::new(2, Duration::from_millis(200));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn zero_limit_never_waits() {
        let limiter = RateLimiter::per_minute(0);
        assert!(format!("{limiter:?}").contains("enabled: false"));
        for _ in 0..100 {
            limiter.acquire().await;
        }
    }
}
