//! The seam between the queue and an email provider.

use std::fmt::{self, Debug};

use async_trait::async_trait;
use courier_common::{EmailType, tracing};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::TransportError;

/// A message ready to hand to a provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
    pub email_type: EmailType,
}

impl OutgoingEmail {
    #[must_use]
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
        email_type: EmailType,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
            html: None,
            email_type,
        }
    }

    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }
}

// Recipient addresses and bodies never reach the logs.
impl Debug for OutgoingEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingEmail")
            .field("to", &"<redacted>")
            .field("subject_len", &self.subject.len())
            .field("has_html", &self.html.is_some())
            .field("email_type", &self.email_type)
            .finish()
    }
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Async email sending trait.
///
/// Implement this trait to plug in a provider. Any `Err`, and any panic,
/// counts as a failed attempt.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, TransportError>;
}

/// Transport that accepts everything and only logs.
///
/// Used for dry runs and local development.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, TransportError> {
        let message_id = Ulid::new().to_string();
        tracing::info!(
            message_id = %message_id,
            email_type = %email.email_type,
            subject_len = email.subject.len(),
            "Accepted message without sending"
        );

        Ok(SendReceipt { message_id })
    }
}
