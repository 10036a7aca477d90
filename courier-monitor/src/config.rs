//! Monitoring thresholds

use serde::Deserialize;

use crate::MonitorError;

/// Longest retention accepted: one year.
pub const MAX_RETENTION_HOURS: u32 = 24 * 366;

/// Configuration for the event log, its quotas and its alert rules.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Maximum number of log entries held in memory.
    ///
    /// When reached, the oldest 10% are evicted before the next insert.
    ///
    /// Default: 10000
    #[serde(default = "defaults::max_entries_in_memory")]
    pub max_entries_in_memory: usize,

    /// How long entries are kept before [`crate::EventLog::cleanup`] drops them.
    /// At most [`MAX_RETENTION_HOURS`].
    ///
    /// Default: 24 hours
    #[serde(default = "defaults::retention_hours")]
    pub retention_hours: u32,

    /// Sends of one type to one recipient allowed in a trailing hour.
    ///
    /// Default: 5
    #[serde(default = "defaults::max_emails_per_user_per_hour")]
    pub max_emails_per_user_per_hour: usize,

    /// Sends of one type allowed in a trailing hour, across all recipients.
    ///
    /// Default: 1000
    #[serde(default = "defaults::max_emails_per_type_per_hour")]
    pub max_emails_per_type_per_hour: usize,

    /// Error rate above which a critical alert is raised.
    ///
    /// Default: 0.5
    #[serde(default = "defaults::error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Multiple of the trailing hourly average that counts as a volume spike.
    ///
    /// Default: 3.0
    #[serde(default = "defaults::volume_spike_threshold")]
    pub volume_spike_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_entries_in_memory: defaults::max_entries_in_memory(),
            retention_hours: defaults::retention_hours(),
            max_emails_per_user_per_hour: defaults::max_emails_per_user_per_hour(),
            max_emails_per_type_per_hour: defaults::max_emails_per_type_per_hour(),
            error_rate_threshold: defaults::error_rate_threshold(),
            volume_spike_threshold: defaults::volume_spike_threshold(),
        }
    }
}

impl MonitorConfig {
    /// Check thresholds for values that would make the rules meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidConfiguration`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.max_entries_in_memory == 0 {
            return Err(MonitorError::InvalidConfiguration {
                field: "max_entries_in_memory",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.retention_hours == 0 || self.retention_hours > MAX_RETENTION_HOURS {
            return Err(MonitorError::InvalidConfiguration {
                field: "retention_hours",
                reason: format!(
                    "must be within [1, {MAX_RETENTION_HOURS}], got {}",
                    self.retention_hours
                ),
            });
        }

        if !(0.0..=1.0).contains(&self.error_rate_threshold) {
            return Err(MonitorError::InvalidConfiguration {
                field: "error_rate_threshold",
                reason: format!("must be within [0, 1], got {}", self.error_rate_threshold),
            });
        }

        if self.volume_spike_threshold.is_nan() || self.volume_spike_threshold <= 0.0 {
            return Err(MonitorError::InvalidConfiguration {
                field: "volume_spike_threshold",
                reason: format!("must be positive, got {}", self.volume_spike_threshold),
            });
        }

        Ok(())
    }
}

mod defaults {
    pub const fn max_entries_in_memory() -> usize {
        10_000
    }

    pub const fn retention_hours() -> u32 {
        24
    }

    pub const fn max_emails_per_user_per_hour() -> usize {
        5
    }

    pub const fn max_emails_per_type_per_hour() -> usize {
        1000
    }

    pub const fn error_rate_threshold() -> f64 {
        0.5
    }

    pub const fn volume_spike_threshold() -> f64 {
        3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.max_entries_in_memory, 10_000);
        assert_eq!(config.retention_hours, 24);
        assert_eq!(config.max_emails_per_user_per_hour, 5);
        assert_eq!(config.max_emails_per_type_per_hour, 1000);
        assert!((config.error_rate_threshold - 0.5).abs() < f64::EPSILON);
        assert!((config.volume_spike_threshold - 3.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_monitor_config_rejects_out_of_range() {
        let config = MonitorConfig {
            error_rate_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MonitorConfig {
            max_entries_in_memory: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MonitorConfig {
            volume_spike_threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_monitor_config_bounds_retention() {
        for retention_hours in [0, MAX_RETENTION_HOURS + 1, u32::MAX] {
            let config = MonitorConfig {
                retention_hours,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{retention_hours} accepted");
        }

        let config = MonitorConfig {
            retention_hours: MAX_RETENTION_HOURS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
