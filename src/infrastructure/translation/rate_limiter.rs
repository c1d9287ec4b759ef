//! Process-wide request-rate gate for the translation endpoint.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces call starts at least `1/RPS` apart.
///
/// The mutex is held across the sleep on purpose: the holder IS the next
/// caller, and everyone behind it queues on the lock in arrival order.
pub struct RateLimiter {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    /// Block until a new call may start, then claim the slot.
    pub async fn acquire(&self, request_id: &str) {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(request_id, "Rate limit: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last_start = Some(Instant::now());
    }
}
