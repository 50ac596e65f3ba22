//! Outbound email.

use async_trait::async_trait;

use crate::Result;

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers emails to users.
#[async_trait]
pub trait EmailSender: Send + Sync + 'static {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Writes each message to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}
