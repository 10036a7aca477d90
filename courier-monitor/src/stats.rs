//! Aggregate statistics over the event log

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use courier_common::EmailType;
use serde::Serialize;

use crate::entry::{EmailLogEntry, LogStatus};

/// Statistics for one clock-hour bucket (`:00` to `:59`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyStats {
    pub hour_start: DateTime<Utc>,
    pub total_sent: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Successes over total; 1.0 for an empty bucket.
    pub success_rate: f64,
    pub by_type: BTreeMap<EmailType, u64>,
    pub avg_response_time_ms: Option<f64>,
}

/// Statistics over the whole retained log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStats {
    pub total_sent: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub pending_count: u64,
    pub success_rate: f64,
    /// Failures over finished (succeeded or failed) sends.
    pub error_rate: f64,
    pub by_type: BTreeMap<EmailType, u64>,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Breakdown of failures over the whole retained log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorStats {
    pub total_errors: u64,
    pub error_rate: f64,
    pub by_type: BTreeMap<EmailType, u64>,
    /// Distinct error messages with their counts, most frequent first.
    pub by_message: Vec<(String, u64)>,
}

#[allow(clippy::cast_precision_loss, reason = "counts are far below 2^52")]
pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Default)]
struct Tally {
    total: u64,
    success: u64,
    failed: u64,
    pending: u64,
    by_type: BTreeMap<EmailType, u64>,
}

impl Tally {
    fn add(&mut self, entry: &EmailLogEntry) {
        self.total += 1;
        match entry.status {
            LogStatus::Success => self.success += 1,
            LogStatus::Failed => self.failed += 1,
            LogStatus::Pending => self.pending += 1,
        }
        *self.by_type.entry(entry.email_type).or_default() += 1;
    }

    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            ratio(self.success, self.total)
        }
    }
}

pub(crate) fn hourly<'a>(
    hour_start: DateTime<Utc>,
    entries: impl Iterator<Item = &'a EmailLogEntry>,
) -> HourlyStats {
    let mut tally = Tally::default();
    let mut response_total = 0u64;
    let mut response_samples = 0u64;

    for entry in entries {
        tally.add(entry);
        if let Some(millis) = entry.response_time_ms {
            response_total = response_total.saturating_add(millis);
            response_samples += 1;
        }
    }

    HourlyStats {
        hour_start,
        total_sent: tally.total,
        success_count: tally.success,
        failure_count: tally.failed,
        success_rate: tally.success_rate(),
        avg_response_time_ms: (response_samples > 0)
            .then(|| ratio(response_total, response_samples)),
        by_type: tally.by_type,
    }
}

pub(crate) fn overall<'a>(entries: impl Iterator<Item = &'a EmailLogEntry>) -> OverallStats {
    let mut tally = Tally::default();
    let mut oldest: Option<DateTime<Utc>> = None;
    let mut newest: Option<DateTime<Utc>> = None;

    for entry in entries {
        tally.add(entry);
        oldest = Some(oldest.map_or(entry.timestamp, |t| t.min(entry.timestamp)));
        newest = Some(newest.map_or(entry.timestamp, |t| t.max(entry.timestamp)));
    }

    OverallStats {
        total_sent: tally.total,
        success_count: tally.success,
        failure_count: tally.failed,
        pending_count: tally.pending,
        success_rate: tally.success_rate(),
        error_rate: ratio(tally.failed, tally.success + tally.failed),
        by_type: tally.by_type,
        oldest_entry: oldest,
        newest_entry: newest,
    }
}

pub(crate) fn errors<'a>(entries: impl Iterator<Item = &'a EmailLogEntry>) -> ErrorStats {
    let mut finished = 0u64;
    let mut total_errors = 0u64;
    let mut by_type = BTreeMap::new();
    let mut by_message: BTreeMap<&str, u64> = BTreeMap::new();

    for entry in entries {
        match entry.status {
            LogStatus::Success => finished += 1,
            LogStatus::Failed => {
                finished += 1;
                total_errors += 1;
                *by_type.entry(entry.email_type).or_default() += 1;
                let message = entry.error_message.as_deref().unwrap_or("unknown error");
                *by_message.entry(message).or_default() += 1;
            }
            LogStatus::Pending => {}
        }
    }

    let mut by_message: Vec<(String, u64)> = by_message
        .into_iter()
        .map(|(message, count)| (message.to_string(), count))
        .collect();
    by_message.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ErrorStats {
        total_errors,
        error_rate: ratio(total_errors, finished),
        by_type,
        by_message,
    }
}

#[cfg(test)]
mod tests {
    use courier_common::RecipientHasher;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::entry::NewLogEntry;

    fn entry(new: NewLogEntry) -> EmailLogEntry {
        EmailLogEntry::from_new(new, Utc::now())
    }

    #[test]
    fn test_error_stats_orders_messages_by_frequency() {
        let hash = RecipientHasher::default().hash("a@x.com");
        let entries = [
            entry(NewLogEntry::failure(EmailType::Reset, hash.clone(), "timeout")),
            entry(NewLogEntry::failure(EmailType::Reset, hash.clone(), "rejected")),
            entry(NewLogEntry::failure(EmailType::Invite, hash.clone(), "timeout")),
            entry(NewLogEntry::success(EmailType::Invite, hash)),
        ];

        let stats = errors(entries.iter());
        assert_eq!(stats.total_errors, 3);
        assert!((stats.error_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(
            stats.by_message,
            vec![("timeout".to_string(), 2), ("rejected".to_string(), 1)]
        );
        assert_eq!(stats.by_type.get(&EmailType::Reset), Some(&2));
    }

    #[test]
    fn test_empty_bucket_reports_full_success() {
        let stats = hourly(Utc::now(), std::iter::empty());
        assert_eq!(stats.total_sent, 0);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(stats.avg_response_time_ms, None);
    }
}
