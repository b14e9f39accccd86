//! Fixed-window request limiter shared by all translation jobs.
//!
//! The window state sits behind a `tokio::sync::Mutex`, which hands the lock
//! out in FIFO order. A caller that finds the window exhausted sleeps while
//! still holding the lock, so later callers queue up behind it and are
//! released in arrival order once the window rolls over.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::config::RateLimitConfig;

/// Current window usage, for status reporting.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    pub used: u32,
    pub quota: u32,
    pub resets_in_ms: u64,
}

struct Window {
    count: u32,
    resets_at: Instant,
}

pub struct RateLimiter {
    quota: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(quota: u32, window: Duration) -> Self {
        Self {
            quota: quota.max(1),
            window,
            state: Mutex::new(Window {
                count: 0,
                resets_at: Instant::now() + window,
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_window, config.window())
    }

    /// Wait for one request slot.
    pub async fn acquire(&self) {
        self.acquire_many(1).await;
    }

    /// Wait until `permits` slots fit in the current window, then claim them.
    ///
    /// Requests larger than the quota are clamped to the quota so they can
    /// always be satisfied by a fresh window.
    pub async fn acquire_many(&self, permits: u32) {
        let permits = permits.clamp(1, self.quota);
        let mut window = self.state.lock().await;

        loop {
            let now = Instant::now();
            if now >= window.resets_at {
                window.count = 0;
                window.resets_at = now + self.window;
            }

            if window.count + permits <= self.quota {
                window.count += permits;
                return;
            }

            let wait = window.resets_at.saturating_duration_since(now);
            info!(
                "Rate limit reached ({}/{}), waiting {}ms",
                window.count,
                self.quota,
                wait.as_millis()
            );
            tokio::time::sleep_until(window.resets_at).await;
        }
    }

    /// Usage of the current window. Returns `None` while a caller is waiting.
    pub fn snapshot(&self) -> Option<RateLimitSnapshot> {
        let window = self.state.try_lock().ok()?;
        let now = Instant::now();
        let (used, resets_in) = if now >= window.resets_at {
            (0, Duration::ZERO)
        } else {
            (window.count, window.resets_at - now)
        };

        Some(RateLimitSnapshot {
            used,
            quota: self.quota,
            resets_in_ms: u64::try_from(resets_in.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_requests_within_quota_do_not_wait() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.snapshot().unwrap().used, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excess_requests_wait_for_window_reset() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(limiter.snapshot().unwrap().used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_releases_never_exceed_quota_per_window() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(10)));
        let start = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut per_window = [0u32; 4];
        for handle in handles {
            let elapsed = handle.await.unwrap();
            let window = usize::try_from(elapsed.as_secs() / 10).unwrap();
            per_window[window] += 1;
        }

        assert_eq!(per_window, [3, 3, 2, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_many_is_clamped_to_quota() {
        let limiter = RateLimiter::new(2, Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire_many(10).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.acquire_many(1).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
