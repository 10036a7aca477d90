//! Alerts and the sinks that receive them

use core::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which rule produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighErrorRate,
    VolumeSpike,
}

impl AlertKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HighErrorRate => "high_error_rate",
            Self::VolumeSpike => "volume_spike",
        }
    }
}

impl Display for AlertKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A rule violation. Emitted to sinks, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub threshold: Option<f64>,
    pub current: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of alerts.
///
/// Sinks are invoked synchronously on the thread that detected the violation,
/// so implementations should hand off anything slow. A panicking sink is
/// isolated and does not stop delivery to the others.
pub trait AlertSink: Send + Sync {
    fn on_alert(&self, alert: &Alert);
}

impl<F> AlertSink for F
where
    F: Fn(&Alert) + Send + Sync,
{
    fn on_alert(&self, alert: &Alert) {
        self(alert);
    }
}

/// Handle returned by [`crate::EventLog::on_alert`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Sink that forwards alerts to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn on_alert(&self, alert: &Alert) {
        match alert.severity {
            Severity::Critical => tracing::error!(
                kind = %alert.kind,
                threshold = ?alert.threshold,
                current = ?alert.current,
                "{}",
                alert.message
            ),
            Severity::Warning => tracing::warn!(
                kind = %alert.kind,
                threshold = ?alert.threshold,
                current = ?alert.current,
                "{}",
                alert.message
            ),
            Severity::Info => tracing::info!(kind = %alert.kind, "{}", alert.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_serializes_with_wire_names() {
        let alert = Alert {
            kind: AlertKind::HighErrorRate,
            severity: Severity::Critical,
            message: "error rate 80%".to_string(),
            threshold: Some(0.5),
            current: Some(0.8),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&alert).unwrap_or_default();
        assert_eq!(json["kind"], "high_error_rate");
        assert_eq!(json["severity"], "critical");
    }

    #[test]
    fn test_closures_are_sinks() {
        let seen = std::sync::atomic::AtomicUsize::new(0);
        let sink = |_: &Alert| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        };

        sink.on_alert(&Alert {
            kind: AlertKind::VolumeSpike,
            severity: Severity::Warning,
            message: String::new(),
            threshold: None,
            current: None,
            timestamp: Utc::now(),
        });
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
