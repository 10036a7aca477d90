//! What callers submit, and what they get back.

use chrono::{DateTime, Utc};
use courier_common::EmailType;
use courier_delivery::{CooldownDecision, EnqueueOptions, OutgoingEmail, Priority, QueueItemId};
use serde::{Deserialize, Serialize};

/// A request to send one email.
#[derive(Clone, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub subject: String,
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(rename = "type")]
    pub email_type: EmailType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl SendRequest {
    pub(crate) fn into_parts(self) -> (OutgoingEmail, EnqueueOptions) {
        let options = EnqueueOptions {
            priority: self.priority,
            scheduled_for: self.scheduled_for,
        };
        let email = OutgoingEmail {
            to: self.to,
            subject: self.subject,
            text: self.text,
            html: self.html,
            email_type: self.email_type,
        };

        (email, options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleReason {
    CoolingDown,
    UserQuota,
    TypeQuota,
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Submission {
    Queued {
        id: QueueItemId,
    },
    Throttled {
        reason: ThrottleReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
}

impl Submission {
    pub(crate) fn throttled(decision: CooldownDecision) -> Self {
        let (reason, retry_after_secs) = match decision {
            CooldownDecision::CoolingDown { remaining } => (
                ThrottleReason::CoolingDown,
                Some(remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)),
            ),
            CooldownDecision::UserQuotaExceeded => (ThrottleReason::UserQuota, None),
            // `Allowed` never reaches here
            CooldownDecision::TypeQuotaExceeded | CooldownDecision::Allowed => {
                (ThrottleReason::TypeQuota, None)
            }
        };

        Self::Throttled {
            reason,
            retry_after_secs,
        }
    }

    #[must_use]
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_request_parses_with_defaults() {
        let request: SendRequest = serde_json::from_str(
            r#"{"to":"a@example.com","subject":"Hi","text":"Hello","type":"invite"}"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let (email, options) = request.into_parts();
        assert_eq!(email.email_type, EmailType::Invite);
        assert_eq!(email.html, None);
        assert_eq!(options, EnqueueOptions::default());
    }

    #[test]
    fn test_throttled_rounds_retry_up() {
        let submission = Submission::throttled(CooldownDecision::CoolingDown {
            remaining: Duration::from_millis(14_200),
        });

        assert_eq!(
            serde_json::to_string(&submission).unwrap_or_default(),
            r#"{"status":"throttled","reason":"cooling_down","retry_after_secs":15}"#
        );
    }
}
