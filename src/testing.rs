//! Test doubles shared by unit tests and the cucumber suite.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::services::mail::{Notifier, NotifyError, Recipient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: Recipient,
    pub subject: String,
    pub body_html: String,
}

/// Keeps every successfully "sent" message in memory. Addresses registered
/// with [`RecordingNotifier::fail_for`] get a transport error instead.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_for(&self, email: impl Into<String>) {
        self.failing.lock().await.insert(email.into());
    }

    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, email: &str) -> Vec<SentEmail> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|message| message.to.email == email)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body_html: &str,
    ) -> Result<(), NotifyError> {
        if self.failing.lock().await.contains(&recipient.email) {
            return Err(NotifyError::Transport(format!(
                "mailbox unavailable: {}",
                recipient.email
            )));
        }
        self.sent.lock().await.push(SentEmail {
            to: recipient.clone(),
            subject: subject.to_string(),
            body_html: body_html.to_string(),
        });
        Ok(())
    }
}
