use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Spaces permits at least `1 / requests_per_second` apart across all callers.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// Creates a limiter admitting at most `requests_per_second` calls per second.
    ///
    /// Non-positive or non-finite rates, and rates so small that their
    /// interval overflows a `Duration`, yield an unlimited limiter.
    /// [`crate::config::ResolverConfig::validate`] rejects the latter.
    pub fn new(requests_per_second: f64) -> Self {
        let interval = permit_interval(requests_per_second);
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self {
            interval: None,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Minimum spacing between two permits, if limited.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Waits until the caller's reserved slot is reached.
    ///
    /// The slot is reserved under the lock and the wait happens after the
    /// lock is released, so waiters queue up in reservation order without
    /// holding each other up.
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = if *next > now { *next } else { now };
            *next = slot + interval;
            slot
        };

        let now = Instant::now();
        if slot > now {
            trace!(wait_ms = (slot - now).as_millis() as u64, "rate limiter wait");
            tokio::time::sleep_until(slot).await;
        }
    }
}

/// Spacing between permits for `requests_per_second`, if it is a usable rate.
pub fn permit_interval(requests_per_second: f64) -> Option<Duration> {
    if requests_per_second.is_nan() || requests_per_second <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / requests_per_second).ok()
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}
