//! Outgoing account email

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Mail delivery failed: {0}")]
pub struct MailError(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Writes mail to the log instead of delivering it
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.body,
            "Outgoing mail (not delivered)"
        );
        Ok(())
    }
}

/// Keeps sent mail in memory so tests can read reset links
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryMailer {
    pub sent: std::sync::Mutex<Vec<OutgoingMail>>,
}

#[cfg(test)]
#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|e| MailError(e.to_string()))?
            .push(mail);
        Ok(())
    }
}
