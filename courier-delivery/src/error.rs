//! Typed error handling for delivery operations.
//!
//! Transport failures never reach the caller of `enqueue`: they are retried
//! and, once retries are exhausted, dead-lettered and surfaced only through
//! the monitor. [`DeliveryError`] covers the failures that *are* reported
//! synchronously.

use thiserror::Error;

/// Errors returned by queue operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// `serve` was called while a worker is already draining this queue.
    #[error("Delivery worker is already running")]
    AlreadyRunning,

    /// Invalid configuration, rejected before it could take effect.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// A failed send attempt.
///
/// Every variant is treated the same way by the queue: the attempt counts as
/// failed and the retry policy decides what happens next.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The provider answered but refused the message.
    #[error("Provider rejected message: {0}")]
    Rejected(String),

    /// The provider could not be reached.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider did not answer in time.
    #[error("Provider timed out: {0}")]
    Timeout(String),

    /// The transport implementation panicked.
    #[error("Transport panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            DeliveryError::AlreadyRunning.to_string(),
            "Delivery worker is already running"
        );
        assert_eq!(
            DeliveryError::Configuration("max_retries must be at least 1".to_string()).to_string(),
            "Configuration error: max_retries must be at least 1"
        );
        assert_eq!(
            TransportError::Rejected("550 mailbox unavailable".to_string()).to_string(),
            "Provider rejected message: 550 mailbox unavailable"
        );
    }
}
