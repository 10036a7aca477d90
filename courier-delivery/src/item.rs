//! Queue entries and their lifecycle values.

use std::{
    fmt::{self, Display},
    str::FromStr,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use courier_common::{EmailType, RecipientHash};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::OutgoingEmail;

/// Dispatch tier. Ordered so that `High < Normal < Low`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque, unique handle returned by `enqueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItemId(Ulid);

impl QueueItemId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for QueueItemId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.trim()).map(Self)
    }
}

/// Caller choices for a new queue entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    #[serde(default)]
    pub priority: Priority,
    /// Not dispatched before this instant.
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl EnqueueOptions {
    #[must_use]
    pub const fn priority(priority: Priority) -> Self {
        Self {
            priority,
            scheduled_for: None,
        }
    }

    #[must_use]
    pub const fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }
}

/// An email awaiting dispatch.
///
/// Items are values: each attempt produces a new item with the attempt
/// recorded rather than mutating the one in the queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    id: QueueItemId,
    email: Arc<OutgoingEmail>,
    recipient_hash: RecipientHash,
    priority: Priority,
    attempts: u32,
    created_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    scheduled_for: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub(crate) fn new(
        email: OutgoingEmail,
        recipient_hash: RecipientHash,
        options: EnqueueOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QueueItemId::generate(),
            email: Arc::new(email),
            recipient_hash,
            priority: options.priority,
            attempts: 0,
            created_at: now,
            last_attempt_at: None,
            scheduled_for: options.scheduled_for,
        }
    }

    /// The item as it stands once another attempt has started at `now`.
    #[must_use]
    pub(crate) fn attempted(&self, now: DateTime<Utc>) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            last_attempt_at: Some(now),
            ..self.clone()
        }
    }

    /// Whether the item may be dispatched at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.is_none_or(|at| at <= now)
    }

    #[must_use]
    pub const fn id(&self) -> QueueItemId {
        self.id
    }

    #[must_use]
    pub fn email(&self) -> &OutgoingEmail {
        &self.email
    }

    #[must_use]
    pub fn email_type(&self) -> EmailType {
        self.email.email_type
    }

    #[must_use]
    pub const fn recipient_hash(&self) -> &RecipientHash {
        &self.recipient_hash
    }

    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    #[must_use]
    pub const fn scheduled_for(&self) -> Option<DateTime<Utc>> {
        self.scheduled_for
    }
}

/// An item whose retries ran out.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub item: QueueItem,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use courier_common::RecipientHasher;

    use super::*;

    fn item(options: EnqueueOptions, now: DateTime<Utc>) -> QueueItem {
        let email = OutgoingEmail::new("a@example.com", "s", "t", EmailType::Notification);
        let hash = RecipientHasher::default().hash(&email.to);
        QueueItem::new(email, hash, options, now)
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_attempted_leaves_original_untouched() {
        let now = Utc::now();
        let original = item(EnqueueOptions::default(), now);
        let later = now + TimeDelta::seconds(5);

        let attempted = original.attempted(later);

        assert_eq!(original.attempts(), 0);
        assert_eq!(original.last_attempt_at(), None);
        assert_eq!(attempted.attempts(), 1);
        assert_eq!(attempted.last_attempt_at(), Some(later));
        assert_eq!(attempted.id(), original.id());
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        assert!(item(EnqueueOptions::default(), now).is_due(now));

        let scheduled = item(
            EnqueueOptions::default().scheduled_for(now + TimeDelta::minutes(1)),
            now,
        );
        assert!(!scheduled.is_due(now));
        assert!(scheduled.is_due(now + TimeDelta::minutes(1)));
    }

    #[test]
    fn test_item_id_parse() {
        let id = QueueItemId::generate();
        assert_eq!(id.to_string().parse::<QueueItemId>().ok(), Some(id));
        assert!("not-an-id".parse::<QueueItemId>().is_err());
    }
}
