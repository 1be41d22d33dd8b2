use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};

use common::utils::config::AppConfig;

/// Bounded-retry policy for optimistic numbering: how many times to propose
/// a page number before giving up, and how long to back off in between.
///
/// Kept as a value type so the bound and delays can be asserted on without a
/// store in the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(400);

    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.numbering_max_attempts,
            Duration::from_millis(cfg.numbering_base_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delays between attempts: exponential from the base, capped, jittered.
    /// `max_attempts` attempts need `max_attempts - 1` delays.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.base_delay.as_millis().max(1) as u64)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}
