//! Token-interval rate limiting for source fetches

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Enforces a minimum spacing between consecutive requests
///
/// The quota has a burst of one, so after the first request every further
/// request waits `1 / requests_per_second`.
#[derive(Clone)]
pub struct RequestRateLimiter {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    interval: Duration,
}

impl RequestRateLimiter {
    /// Create a limiter for the given maximum requests per second
    pub fn new(requests_per_second: f64) -> Self {
        // Anything below one request per ten seconds is treated as 0.1 rps
        let rps = if requests_per_second.is_finite() {
            requests_per_second.max(0.1)
        } else {
            1.0
        };
        let interval = Duration::from_secs_f64(1.0 / rps);
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
            .allow_burst(nonzero!(1u32));

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            interval,
        }
    }

    /// Minimum spacing between two requests
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next request is allowed
    pub async fn wait(&self) {
        trace!("Rate limiting: interval {:?}", self.interval);
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_spacing_between_requests() {
        let limiter = RequestRateLimiter::new(10.0); // 100ms between requests

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        let elapsed = start.elapsed();

        // Three requests span two intervals
        assert!(elapsed >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let limiter = RequestRateLimiter::new(0.5);

        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_rate_floor() {
        let limiter = RequestRateLimiter::new(0.0);
        assert_eq!(limiter.interval(), Duration::from_secs(10));
    }
}
