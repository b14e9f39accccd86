//! Exponential backoff for provider calls.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Longest single wait between attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(300);

/// Retry policy: wait `base_delay * growth_factor^attempt` between attempts,
/// giving up after `max_retries` retries.
///
/// A `Retry-After` hint from the provider raises the wait for that attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub growth_factor: f64,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration, growth_factor: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            growth_factor,
        }
    }

    pub const fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            config.growth_factor,
        )
    }

    /// Policy that never retries.
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO, 1.0)
    }

    /// Delay before retry number `attempt` (0-based), capped at [`MAX_DELAY`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let seconds = self.base_delay.as_secs_f64() * self.growth_factor.powi(exponent);
        Duration::try_from_secs_f64(seconds).map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
    }

    /// Delay before retrying after `error`: the backoff for `attempt`, or the
    /// provider's `Retry-After` when that is longer.
    fn delay_after(&self, error: &Error, attempt: u32) -> Duration {
        let backoff = self.delay_for(attempt);
        match error {
            Error::ProviderRateLimited {
                retry_after: Some(seconds),
            } => backoff.max(Duration::from_secs(*seconds).min(MAX_DELAY)),
            _ => backoff,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent. The last error is returned on failure.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_after(&e, attempt);
                    debug!(
                        "Retrying in {}ms (attempt {}/{}): {}",
                        delay.as_millis(),
                        attempt + 2,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
