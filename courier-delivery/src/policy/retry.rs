//! Retry policy for delivery attempts.
//!
//! A failed attempt is retried after `retry_delay * 2^(attempts - 1)`, capped
//! at `max_retry_delay` and optionally randomised by `retry_jitter_factor`.
//! Once `max_retries` attempts have failed the item is dead-lettered.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::DeliveryError;

/// Retry policy configuration for delivery attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts an item may make, the first one included.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (in milliseconds).
    ///
    /// Default: 5000
    #[serde(default = "defaults::retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Ceiling for a single backoff (in milliseconds).
    ///
    /// Default: 3600000 (1 hour)
    #[serde(default = "defaults::max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Randomise each backoff within ±`retry_jitter_factor`.
    ///
    /// Default: 0.0 (deterministic)
    #[serde(default)]
    pub retry_jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            retry_delay_ms: defaults::retry_delay_ms(),
            max_retry_delay_ms: defaults::max_retry_delay_ms(),
            retry_jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Reject settings the worker could not honour.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if `max_retries` is zero or
    /// the jitter factor lies outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.max_retries == 0 {
            return Err(DeliveryError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            return Err(DeliveryError::Configuration(format!(
                "retry_jitter_factor must be within [0, 1], got {}",
                self.retry_jitter_factor
            )));
        }

        Ok(())
    }

    /// Whether an item that has failed `attempts` times gets another go.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_retries
    }

    /// Delay before retrying an item that has made `attempts` attempts.
    #[must_use]
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        let delay = if exponent >= 63 {
            self.max_retry_delay_ms
        } else {
            self.retry_delay_ms
                .saturating_mul(1u64 << exponent)
                .min(self.max_retry_delay_ms)
        };

        if self.retry_jitter_factor <= 0.0 {
            return Duration::from_millis(delay);
        }

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let jittered = {
            let range = (delay as f64) * self.retry_jitter_factor;
            let jitter: f64 = rand::rng().random_range(-range..=range);
            ((delay as f64) + jitter).max(0.0) as u64
        };

        Duration::from_millis(jittered)
    }

    /// Attempts left before the item is dead-lettered.
    #[must_use]
    pub const fn remaining_attempts(&self, attempts: u32) -> u32 {
        self.max_retries.saturating_sub(attempts)
    }
}

mod defaults {
    pub const fn max_retries() -> u32 {
        3
    }

    pub const fn retry_delay_ms() -> u64 {
        5_000
    }

    pub const fn max_retry_delay_ms() -> u64 {
        3_600_000
    }
}
