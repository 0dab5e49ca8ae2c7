use async_trait::async_trait;
use futures::future::join_all;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{config::MailConfig, error::AppError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub name: Option<String>,
    pub email: String,
}

impl Recipient {
    pub fn new(name: Option<String>, email: impl Into<String>) -> Self {
        Self {
            name,
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("invalid address {0}")]
    InvalidAddress(String),
    #[error("could not build message: {0}")]
    Build(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// A fully rendered message for a single recipient.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: Recipient,
    pub subject: String,
    pub body_html: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body_html: &str,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct NotificationFailure {
    pub recipient: Recipient,
    pub reason: NotifyError,
}

/// Per-recipient outcome of a notification round.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<Recipient>,
    pub failed: Vec<NotificationFailure>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record_failure(&mut self, recipient: Recipient, reason: NotifyError) {
        warn!(to = %recipient.email, error = %reason, "notification failed");
        self.failed.push(NotificationFailure { recipient, reason });
    }
}

/// Sends every message concurrently and waits for all of them. A failed
/// recipient never prevents delivery to the others.
pub async fn deliver_all(notifier: &dyn Notifier, emails: Vec<OutgoingEmail>) -> DeliveryReport {
    let sends = emails.into_iter().map(|email| async move {
        let result = notifier
            .send(&email.to, &email.subject, &email.body_html)
            .await;
        (email.to, result)
    });

    let mut report = DeliveryReport::default();
    for (recipient, result) in join_all(sends).await {
        match result {
            Ok(()) => report.delivered.push(recipient),
            Err(reason) => report.record_failure(recipient, reason),
        }
    }

    if !report.delivered.is_empty() {
        info!(
            targets = ?report.delivered.iter().map(|r| r.email.as_str()).collect::<Vec<_>>(),
            "notifications sent"
        );
    }
    report
}

fn mailbox(recipient: &Recipient) -> Result<Mailbox, NotifyError> {
    let address: Address = recipient
        .email
        .parse()
        .map_err(|_| NotifyError::InvalidAddress(recipient.email.clone()))?;
    Ok(Mailbox::new(recipient.name.clone(), address))
}

#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &MailConfig) -> Result<Self, AppError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| AppError::Config("SMTP_HOST is not set".into()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|err| AppError::Config(format!("invalid SMTP_HOST: {err}")))?
            .port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = mailbox(&Recipient::new(
            Some(config.from_name.clone()),
            config.from_address.clone(),
        ))
        .map_err(|err| AppError::Config(format!("invalid MAIL_FROM_ADDRESS: {err}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body_html: &str,
    ) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(mailbox(recipient)?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body_html.to_string())
            .map_err(|err| NotifyError::Build(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        Ok(())
    }
}

/// Development notifier: writes every message to the log instead of sending it.
#[derive(Clone, Debug)]
pub struct LogNotifier {
    from: String,
}

impl LogNotifier {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            from: format!("{} <{}>", config.from_name, config.from_address),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body_html: &str,
    ) -> Result<(), NotifyError> {
        mailbox(recipient)?;
        info!(
            from = %self.from,
            to = %recipient.email,
            subject = %subject,
            body = %body_html,
            "email (not sent, SMTP_HOST unset)"
        );
        Ok(())
    }
}
