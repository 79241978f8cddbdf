//! Fire-and-forget delivery

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

use super::{LogMailer, Mailer, OutgoingMail};
use crate::metrics;

/// Hands mail to a background task. Delivery failures are logged and
/// counted, never returned to the caller.
#[derive(Clone)]
pub struct MailDispatcher {
    mailer: Arc<dyn Mailer>,
}

impl MailDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        MailDispatcher { mailer }
    }

    /// Dispatcher that only logs
    pub fn disabled() -> Self {
        MailDispatcher::new(Arc::new(LogMailer))
    }

    /// Must be called from within a Tokio runtime (including its blocking
    /// pool); otherwise the mail is dropped with a warning.
    pub fn dispatch(&self, mail: OutgoingMail) -> Option<JoinHandle<()>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(to = %mail.to, "no async runtime, dropping mail");
                metrics::record_mail_failure();
                return None;
            }
        };

        let mailer = Arc::clone(&self.mailer);
        Some(handle.spawn(async move {
            if let Err(e) = mailer.send(&mail).await {
                warn!(to = %mail.to, subject = %mail.subject, error = %e, "mail delivery failed");
                metrics::record_mail_failure();
            }
        }))
    }
}

impl Default for MailDispatcher {
    fn default() -> Self {
        MailDispatcher::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_mail::testing::RecordingMailer;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            to: to.to_string(),
            subject: "s".to_string(),
            html: "<p>b</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let recorder = RecordingMailer::default();
        let dispatcher = MailDispatcher::new(Arc::new(recorder.clone()));

        dispatcher.dispatch(mail("a@example.com")).unwrap().await.unwrap();
        assert_eq!(recorder.sent(), vec![mail("a@example.com")]);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let recorder = RecordingMailer { fail: true, ..Default::default() };
        let dispatcher = MailDispatcher::new(Arc::new(recorder.clone()));

        dispatcher.dispatch(mail("a@example.com")).unwrap().await.unwrap();
        assert!(recorder.sent().is_empty());
    }

    #[test]
    fn test_without_runtime_mail_is_dropped() {
        let dispatcher = MailDispatcher::disabled();
        assert!(dispatcher.dispatch(mail("a@example.com")).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_from_blocking_pool() {
        let recorder = RecordingMailer::default();
        let dispatcher = MailDispatcher::new(Arc::new(recorder.clone()));

        let handle = tokio::task::spawn_blocking(move || dispatcher.dispatch(mail("b@example.com")))
            .await
            .unwrap()
            .unwrap();
        handle.await.unwrap();
        assert_eq!(recorder.sent().len(), 1);
    }
}
