//! Log entries and metadata scrubbing

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use courier_common::{EmailType, RecipientHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

/// Free-form metadata attached to a log entry.
pub type Metadata = BTreeMap<String, Value>;

/// Metadata key fragments that are always removed before storage.
///
/// Matching is a case-insensitive substring match on the key name, applied
/// recursively to nested objects.
pub const PII_KEYS: [&str; 7] = [
    "email",
    "recipient",
    "name",
    "phone",
    "address",
    "ip",
    "useragent",
];

fn is_pii_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    PII_KEYS.iter().any(|pii| key.contains(pii))
}

fn scrub_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !is_pii_key(key))
                .map(|(key, value)| (key, scrub_value(value)))
                .collect(),
        ),
        Value::Array(values) => Value::Array(values.into_iter().map(scrub_value).collect()),
        other => other,
    }
}

/// Strip every PII key from `metadata`.
#[must_use]
pub fn scrub_metadata(metadata: Metadata) -> Metadata {
    metadata
        .into_iter()
        .filter(|(key, _)| !is_pii_key(key))
        .map(|(key, value)| (key, scrub_value(value)))
        .collect()
}

/// Outcome recorded for a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
    Pending,
}

/// An observation submitted to [`crate::EventLog::record`].
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub email_type: EmailType,
    pub status: LogStatus,
    pub user_hash: RecipientHash,
    pub error_message: Option<String>,
    pub response_time_ms: Option<u64>,
    pub metadata: Metadata,
}

impl NewLogEntry {
    #[must_use]
    pub fn new(email_type: EmailType, status: LogStatus, user_hash: RecipientHash) -> Self {
        Self {
            email_type,
            status,
            user_hash,
            error_message: None,
            response_time_ms: None,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn success(email_type: EmailType, user_hash: RecipientHash) -> Self {
        Self::new(email_type, LogStatus::Success, user_hash)
    }

    #[must_use]
    pub fn failure(
        email_type: EmailType,
        user_hash: RecipientHash,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error_message: Some(error.into()),
            ..Self::new(email_type, LogStatus::Failed, user_hash)
        }
    }

    #[must_use]
    pub fn with_response_time(mut self, millis: u64) -> Self {
        self.response_time_ms = Some(millis);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A stored observation. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailLogEntry {
    pub id: Ulid,
    pub timestamp: DateTime<Utc>,
    pub email_type: EmailType,
    pub status: LogStatus,
    pub user_hash: RecipientHash,
    pub error_message: Option<String>,
    pub response_time_ms: Option<u64>,
    pub metadata: Metadata,
}

impl EmailLogEntry {
    pub(crate) fn from_new(entry: NewLogEntry, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new(),
            timestamp,
            email_type: entry.email_type,
            status: entry.status,
            user_hash: entry.user_hash,
            error_message: entry.error_message,
            response_time_ms: entry.response_time_ms,
            metadata: scrub_metadata(entry.metadata),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == LogStatus::Success
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == LogStatus::Failed
    }
}
