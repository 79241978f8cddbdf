//! Outgoing mail
//!
//! Mail is best effort: callers hand an [`OutgoingMail`] to the
//! [`MailDispatcher`], which delivers it in the background and only logs
//! failures.

mod dispatcher;
mod invitations;
mod smtp;
mod templates;

pub use dispatcher::MailDispatcher;
pub use invitations::{invite_link, InvitationSender};
pub use smtp::SmtpMailer;
pub use templates::{invitation_mail, reset_mail};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build mail: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// A single rendered mail to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Delivers rendered mail
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Logs mail instead of sending it. Used when `[mail] enabled = false`.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "mail delivery disabled, not sending");
        Ok(())
    }
}
