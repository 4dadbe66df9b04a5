use async_trait::async_trait;

use crate::domain::subscriber_email::SubscriberEmail;

/// How a failed send should be treated by whoever decides on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendErrorKind {
    /// Network trouble, timeouts, rate limiting or a provider outage.
    Transient,
    /// The provider rejected the message (bad address, auth, payload).
    Permanent,
}

#[derive(thiserror::Error, Debug)]
#[error("{kind:?} failure while sending an email: {message}")]
pub struct SendError {
    pub kind: SendErrorKind,
    pub message: String,
}

impl SendError {
    pub fn transient(message: impl Into<String>) -> SendError {
        SendError {
            kind: SendErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> SendError {
        SendError {
            kind: SendErrorKind::Permanent,
            message: message.into(),
        }
    }
}

/// Delivers one rendered message to one recipient.
///
/// Implementations own their connection and throughput limits, and any retry
/// policy belongs here rather than in the dispatch engine.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<(), SendError>;
}

/// Result of one send attempt for one roster member.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub recipient: SubscriberEmail,
    pub error_kind: Option<SendErrorKind>,
}

impl SendOutcome {
    pub fn delivered(recipient: SubscriberEmail) -> SendOutcome {
        SendOutcome {
            recipient,
            error_kind: None,
        }
    }

    pub fn failed(recipient: SubscriberEmail, kind: SendErrorKind) -> SendOutcome {
        SendOutcome {
            recipient,
            error_kind: Some(kind),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error_kind.is_none()
    }
}
