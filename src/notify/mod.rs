//! Outbound notifications
//!
//! Registration hands welcome emails to a [`NotificationQueue`]; a
//! background task delivers them through a [`Notifier`]. Delivery failures
//! are logged and go no further.

pub mod mailgun;
pub mod queue;
pub mod welcome;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

pub use mailgun::MailgunNotifier;
pub use queue::NotificationQueue;
pub use welcome::WelcomeTemplate;

/// A plain-text email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Errors from a notifier
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected by provider ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Delivers a message somewhere
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Writes messages to the log instead of sending them. Used in dev mode and
/// when no mail provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            "Email not sent (log notifier)"
        );
        Ok(())
    }
}
