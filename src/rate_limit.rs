use std::time::Duration;
use tokio::time::{self, Instant};

const REFILL_PERIOD: Duration = Duration::from_secs(1);

/// Coarse per-second token budget.
///
/// The bucket holds `max` tokens and is topped back up to `max` once per second. Refill
/// is not smoothed: a full budget can be spent in a burst at the start of each second.
/// Owned by a single task, so there is no synchronization.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    max: usize,
    tokens: usize,
    next_refill: Instant,
}

impl RateLimiter {
    pub(crate) fn new(max_per_second: usize) -> Self {
        Self {
            max: max_per_second,
            tokens: max_per_second,
            next_refill: Instant::now() + REFILL_PERIOD,
        }
    }

    /// Takes one token, waiting for the next refill when the budget is spent.
    pub(crate) async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            if now >= self.next_refill {
                self.tokens = self.max;
                self.next_refill = now + REFILL_PERIOD;
            }
            if self.tokens > 0 {
                self.tokens -= 1;
                return;
            }
            time::sleep_until(self.next_refill).await;
        }
    }
}
