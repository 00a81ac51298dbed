//! Exponential backoff for channel reconnects.

use std::time::Duration;

/// Retry delay and give-up rule, as a function of the attempt count.
///
/// Attempt `0` is the first retry after a failure. Delays grow by
/// `growth_factor` per attempt and are capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub growth_factor: f64,
    pub max_delay: Duration,
    /// Number of reconnects tried before giving up for good.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2000),
            growth_factor: 1.5,
            max_delay: Duration::from_millis(30000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// `min(max_delay, base_delay * growth_factor^attempt)`, rounded to whole milliseconds.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.base_delay.as_millis() as f64 * self.growth_factor.powi(exponent);
        let cap = self.max_delay.as_millis() as f64;
        Duration::from_millis(millis.min(cap).round() as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Snapshot of a channel's retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectState {
    pub attempt: u32,
    /// `None` once the attempt budget is spent.
    pub next_delay: Option<Duration>,
}

impl ReconnectState {
    pub fn new(policy: &ReconnectPolicy, attempt: u32) -> Self {
        Self {
            attempt,
            next_delay: policy
                .should_retry(attempt)
                .then(|| policy.next_delay(attempt)),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_delay.is_none()
    }
}
