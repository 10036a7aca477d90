//! The bounded event log

use std::{
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use courier_common::{EmailType, RecipientHash, SharedClock};
use parking_lot::RwLock;

use crate::{
    MonitorConfig, MonitorError,
    alert::{Alert, AlertKind, AlertSink, Severity, SubscriptionId},
    entry::{EmailLogEntry, NewLogEntry},
    stats::{self, ErrorStats, HourlyStats, OverallStats},
};

/// Minimum number of finished sends before error-rate alerts are considered.
const MIN_VOLUME_FOR_ERROR_ALERT: u64 = 10;

/// Hours of history the volume-spike baseline is averaged over.
const SPIKE_BASELINE_HOURS: u32 = 24;

fn hour_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at)
}

/// In-memory, PII-free record of send attempts.
///
/// Writers (the delivery worker) and readers (the cooldown gate, operators)
/// may run concurrently; the entries are guarded by a single `RwLock`.
/// Alert sinks are always invoked after that lock has been released, so a
/// sink may safely call back into the log.
pub struct EventLog {
    config: MonitorConfig,
    clock: SharedClock,
    entries: RwLock<VecDeque<EmailLogEntry>>,
    sinks: RwLock<Vec<(SubscriptionId, Arc<dyn AlertSink>)>>,
    next_subscription: AtomicU64,
}

impl core::fmt::Debug for EventLog {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fmt.debug_struct("EventLog")
            .field("config", &self.config)
            .field("entries", &self.entries.read().len())
            .field("sinks", &self.sinks.read().len())
            .finish_non_exhaustive()
    }
}

impl EventLog {
    /// Create an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: MonitorConfig, clock: SharedClock) -> Result<Self, MonitorError> {
        config.validate()?;

        Ok(Self {
            config,
            clock,
            entries: RwLock::new(VecDeque::new()),
            sinks: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Record an observation.
    ///
    /// Metadata is scrubbed of PII, the memory bound is enforced, and if the
    /// entry is a failure the trailing-hour success rate is re-checked so that
    /// a collapse is alerted on immediately rather than at the next sweep.
    pub fn record(&self, entry: NewLogEntry) -> EmailLogEntry {
        let now = self.clock.now();
        let entry = EmailLogEntry::from_new(entry, now);

        {
            let mut entries = self.entries.write();
            let max = self.config.max_entries_in_memory;
            let len = entries.len();
            if len >= max {
                let evict = (max / 10).max(len + 1 - max).min(len);
                entries.drain(..evict);
                tracing::debug!(evicted = evict, max, "Event log full, evicted oldest entries");
            }
            entries.push_back(entry.clone());
        }

        tracing::trace!(
            id = %entry.id,
            email_type = %entry.email_type,
            status = ?entry.status,
            recipient_hash = %entry.user_hash,
            "Recorded email event"
        );

        if entry.is_failure()
            && let Some(alert) = self.trailing_hour_error_check(now)
        {
            self.emit(&alert);
        }

        entry
    }

    fn trailing_hour_error_check(&self, now: DateTime<Utc>) -> Option<Alert> {
        let since = now - TimeDelta::hours(1);
        let (total, successes) = self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.timestamp > since)
            .filter(|entry| entry.is_success() || entry.is_failure())
            .fold((0u64, 0u64), |(total, successes), entry| {
                (total + 1, successes + u64::from(entry.is_success()))
            });

        if total < MIN_VOLUME_FOR_ERROR_ALERT {
            return None;
        }

        let success_rate = stats::ratio(successes, total);
        let floor = 1.0 - self.config.error_rate_threshold;
        (success_rate < floor).then(|| Alert {
            kind: AlertKind::HighErrorRate,
            severity: Severity::Critical,
            message: format!(
                "Success rate dropped to {:.1}% over the last hour ({total} sends)",
                success_rate * 100.0
            ),
            threshold: Some(floor),
            current: Some(success_rate),
            timestamp: now,
        })
    }

    fn count_trailing_hour(&self, predicate: impl Fn(&EmailLogEntry) -> bool) -> usize {
        let since = self.clock.now() - TimeDelta::hours(1);
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.timestamp > since && predicate(entry))
            .count()
    }

    /// Whether one more `email_type` send to `user_hash` fits the hourly
    /// per-user quota.
    #[must_use]
    pub fn can_send_to_user(&self, user_hash: &RecipientHash, email_type: EmailType) -> bool {
        let sent = self.count_trailing_hour(|entry| {
            entry.email_type == email_type && &entry.user_hash == user_hash
        });
        sent < self.config.max_emails_per_user_per_hour
    }

    /// Whether one more `email_type` send fits the hourly per-type quota.
    #[must_use]
    pub fn can_send_type(&self, email_type: EmailType) -> bool {
        let sent = self.count_trailing_hour(|entry| entry.email_type == email_type);
        sent < self.config.max_emails_per_type_per_hour
    }

    /// Statistics for the clock-hour containing `hour` (default: now).
    #[must_use]
    pub fn hourly_stats(&self, hour: Option<DateTime<Utc>>) -> HourlyStats {
        let start = hour_bucket(hour.unwrap_or_else(|| self.clock.now()));
        let end = start + TimeDelta::hours(1);
        let entries = self.entries.read();

        stats::hourly(
            start,
            entries
                .iter()
                .filter(|entry| entry.timestamp >= start && entry.timestamp < end),
        )
    }

    #[must_use]
    pub fn overall_stats(&self) -> OverallStats {
        stats::overall(self.entries.read().iter())
    }

    #[must_use]
    pub fn error_stats(&self) -> ErrorStats {
        stats::errors(self.entries.read().iter())
    }

    /// Newest entries first, at most `limit` of them.
    #[must_use]
    pub fn recent_entries(&self, limit: usize) -> Vec<EmailLogEntry> {
        self.entries.read().iter().rev().take(limit).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Periodic sweep of the alert rules.
    ///
    /// - Overall error rate above `error_rate_threshold` (with at least ten
    ///   finished sends) raises a critical [`AlertKind::HighErrorRate`].
    /// - Current-hour volume above `volume_spike_threshold` times the average
    ///   of the preceding 24 hours raises a [`AlertKind::VolumeSpike`] warning.
    ///   No baseline (average of zero) means no spike.
    ///
    /// Every alert raised is delivered to the sinks and also returned.
    pub fn check_alerts(&self) -> Vec<Alert> {
        let now = self.clock.now();
        let mut alerts = Vec::new();

        let overall = self.overall_stats();
        let finished = overall.success_count + overall.failure_count;
        if finished >= MIN_VOLUME_FOR_ERROR_ALERT
            && overall.error_rate > self.config.error_rate_threshold
        {
            alerts.push(Alert {
                kind: AlertKind::HighErrorRate,
                severity: Severity::Critical,
                message: format!(
                    "Error rate is {:.1}% across {finished} sends",
                    overall.error_rate * 100.0
                ),
                threshold: Some(self.config.error_rate_threshold),
                current: Some(overall.error_rate),
                timestamp: now,
            });
        }

        let current_hour = hour_bucket(now);
        let baseline_start = current_hour - TimeDelta::hours(i64::from(SPIKE_BASELINE_HOURS));
        let (current, baseline) = self.entries.read().iter().fold(
            (0u64, 0u64),
            |(current, baseline), entry| {
                if entry.timestamp >= current_hour {
                    (current + 1, baseline)
                } else if entry.timestamp >= baseline_start {
                    (current, baseline + 1)
                } else {
                    (current, baseline)
                }
            },
        );

        let average = stats::ratio(baseline, u64::from(SPIKE_BASELINE_HOURS));
        let limit = average * self.config.volume_spike_threshold;
        #[allow(clippy::cast_precision_loss, reason = "hourly volumes are small")]
        let current_volume = current as f64;
        if average > 0.0 && current_volume > limit {
            alerts.push(Alert {
                kind: AlertKind::VolumeSpike,
                severity: Severity::Warning,
                message: format!(
                    "{current} emails this hour against a trailing average of {average:.2}/hour"
                ),
                threshold: Some(limit),
                current: Some(current_volume),
                timestamp: now,
            });
        }

        for alert in &alerts {
            self.emit(alert);
        }

        alerts
    }

    /// Register an alert sink.
    pub fn on_alert(&self, sink: impl AlertSink + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.sinks.write().push((id, Arc::new(sink)));
        id
    }

    /// Remove a previously registered sink. Returns `false` if it was already
    /// removed.
    pub fn remove_alert_sink(&self, id: SubscriptionId) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|(sink_id, _)| *sink_id != id);
        sinks.len() != before
    }

    fn emit(&self, alert: &Alert) {
        let sinks: Vec<Arc<dyn AlertSink>> =
            self.sinks.read().iter().map(|(_, sink)| sink.clone()).collect();

        for sink in sinks {
            if catch_unwind(AssertUnwindSafe(|| sink.on_alert(alert))).is_err() {
                tracing::error!(kind = %alert.kind, "Alert sink panicked while handling alert");
            }
        }
    }

    /// Drop entries older than `retention_hours`. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let retention = TimeDelta::try_hours(self.config.retention_hours.into())
            .unwrap_or(TimeDelta::MAX);
        let Some(cutoff) = self.clock.now().checked_sub_signed(retention) else {
            return 0;
        };
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.timestamp >= cutoff);
        let removed = before - entries.len();
        drop(entries);

        if removed > 0 {
            tracing::debug!(removed, "Evicted expired event log entries");
        }
        removed
    }
}
