//! Error types for the monitor

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// A monitoring threshold is out of range.
    #[error("Invalid monitor configuration for {field}: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },
}
