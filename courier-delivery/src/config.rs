use serde::Deserialize;

use crate::{DeliveryError, RateLimits, RetryPolicy};

/// Configuration for the delivery queue.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub rate_limits: RateLimits,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Longest the worker sleeps before re-checking scheduled items.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::idle_poll_secs")]
    pub idle_poll_secs: u64,

    /// Dead letters retained for inspection; the oldest are dropped first.
    ///
    /// Default: 100
    #[serde(default = "defaults::dead_letter_capacity")]
    pub dead_letter_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimits::default(),
            retry: RetryPolicy::default(),
            idle_poll_secs: defaults::idle_poll_secs(),
            dead_letter_capacity: defaults::dead_letter_capacity(),
        }
    }
}

impl DeliveryConfig {
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] for an invalid retry policy
    /// or a zero idle poll interval.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        self.retry.validate()?;

        if self.idle_poll_secs == 0 {
            return Err(DeliveryError::Configuration(
                "idle_poll_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

mod defaults {
    pub const fn idle_poll_secs() -> u64 {
        10
    }

    pub const fn dead_letter_capacity() -> usize {
        100
    }
}
