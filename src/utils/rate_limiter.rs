//! Fixed-window call throttling for the iNaturalist API.
//!
//! At most `calls` acquisitions are granted per `period`. Once the budget of
//! the current window is spent, [`RateLimiter::acquire`] sleeps until the
//! window ends and then starts a fresh one, so callers never see an error
//! from the limiter itself.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Warn once a single run has spent this long waiting on the limiter.
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub struct RateLimiter {
    calls: u32,
    period: Duration,
    window: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    started: Option<Instant>,
    used: u32,
    waited: Duration,
    warned: bool,
}

impl RateLimiter {
    /// `calls` of zero disables throttling.
    #[must_use]
    pub fn new(calls: u32, period: Duration) -> Self {
        debug!(calls, period_ms = period.as_millis(), "creating rate limiter");
        Self {
            calls,
            period,
            window: Mutex::new(Window {
                started: None,
                used: 0,
                waited: Duration::ZERO,
                warned: false,
            }),
        }
    }

    #[must_use]
    pub fn per_minute(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(60))
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.calls == 0 || self.period.is_zero()
    }

    /// Total time spent sleeping so far.
    pub async fn total_wait(&self) -> Duration {
        self.window.lock().await.waited
    }

    pub async fn acquire(&self) {
        if self.is_disabled() {
            return;
        }

        let mut window = self.window.lock().await;
        let now = Instant::now();

        match window.started {
            Some(started) if now.duration_since(started) < self.period => {
                if window.used >= self.calls {
                    let delay = self.period - now.duration_since(started);
                    window.waited += delay;
                    debug!(
                        delay_ms = delay.as_millis(),
                        waited_ms = window.waited.as_millis(),
                        "rate limit reached, sleeping until the window resets"
                    );
                    if window.waited >= CUMULATIVE_DELAY_WARNING_THRESHOLD && !window.warned {
                        window.warned = true;
                        warn!(
                            waited_secs = window.waited.as_secs(),
                            "spent a long time throttled - consider a larger batch size"
                        );
                    }
                    tokio::time::sleep(delay).await;
                    window.started = Some(Instant::now());
                    window.used = 0;
                }
            }
            _ => {
                window.started = Some(now);
                window.used = 0;
            }
        }

        window.used += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calls_within_budget_do_not_wait() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        let start = std::time::Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(limiter.total_wait().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_exhausted_window_sleeps_until_reset() {
        let limiter = RateLimiter::new(2, Duration::from_millis(200));
        let start = std::time::Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert!(limiter.total_wait().await > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_disabled_limiter_never_waits() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        assert!(limiter.is_disabled());
        let start = std::time::Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
