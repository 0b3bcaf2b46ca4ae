//! Exponential backoff with jitter

use crate::config::FetchConfig;
use rand::Rng;
use std::time::Duration;

/// Retry schedule shared by page fetches and store batches
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: config.jitter.clamp(0.0, 0.99),
        }
    }

    /// Same schedule with a different attempt budget
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before retry number `attempt` (0-based: the wait after the
    /// first failure is `delay_for(0)`)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_millis() as f64;
        if self.jitter <= 0.0 {
            return Duration::from_millis(base as u64);
        }
        let jitter = rand::rng().random_range(-self.jitter..=self.jitter);
        Duration::from_millis((base * (1.0 + jitter)).max(0.0) as u64)
    }

    /// Un-jittered delay, capped at `max_backoff`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(31));
        let millis = (self.initial_backoff.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Server errors and rate-limit responses are worth another attempt
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}
