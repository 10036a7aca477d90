//! Operational telemetry for outbound transactional mail
//!
//! The [`EventLog`] keeps a bounded, in-memory record of every send attempt
//! and provides:
//! - PII scrubbing of free-form metadata before anything is stored
//! - Per-user and per-type hourly quotas, consulted by the cooldown gate
//! - Hourly, overall and error statistics
//! - Threshold alerting, delivered synchronously to registered [`AlertSink`]s
//!
//! Recipients are only ever identified by a [`courier_common::RecipientHash`].

mod alert;
mod config;
mod entry;
mod error;
mod event_log;
mod stats;

pub use alert::{Alert, AlertKind, AlertSink, LogAlertSink, Severity, SubscriptionId};
pub use config::{MAX_RETENTION_HOURS, MonitorConfig};
pub use entry::{EmailLogEntry, LogStatus, Metadata, NewLogEntry, PII_KEYS, scrub_metadata};
pub use error::MonitorError;
pub use event_log::EventLog;
pub use stats::{ErrorStats, HourlyStats, OverallStats};
