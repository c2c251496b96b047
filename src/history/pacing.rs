//! Request pacing against the per-token Slack rate limit

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between acquisitions.
///
/// The first acquisition never waits. Later ones wait until `interval` has
/// elapsed since the previous acquisition completed.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Non-positive rates disable pacing
    pub fn per_second(requests: f64) -> Self {
        if requests.is_finite() && requests > 0.0 {
            Self::with_interval(Duration::from_secs_f64(1.0 / requests))
        } else {
            Self::unlimited()
        }
    }

    pub fn per_minute(requests: u32) -> Self {
        if requests == 0 {
            Self::unlimited()
        } else {
            Self::with_interval(Duration::from_secs(60) / requests)
        }
    }

    pub fn unlimited() -> Self {
        Self::with_interval(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next slot
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            let now = Instant::now();
            if ready_at > now {
                tracing::debug!(
                    delay_ms = (ready_at - now).as_millis() as u64,
                    "Pacing request"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
