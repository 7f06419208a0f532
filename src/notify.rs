//! Outgoing mail. The engine and jobs only ever see the [`Notifier`] trait;
//! the SMTP transport behind it is swapped out for a recording fake in
//! tests.

use anyhow::{Context as _, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Attempts delivery of a plain-text mail. Any error means "attempted
    /// and failed"; callers decide whether to care.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;

    /// Same, with an HTML body (the evening summary is a table).
    async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<SmtpNotifier> {
        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .context("building SMTP transport")?;
        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        let from = config
            .sender()
            .parse()
            .context("parsing sender mailbox")?;
        Ok(SmtpNotifier { transport, from })
    }

    async fn send_with_type(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        content_type: ContentType,
    ) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().with_context(|| format!("parsing recipient {to}"))?)
            .subject(subject)
            .header(content_type)
            .body(body.to_string())
            .context("building message")?;
        self.transport
            .send(message)
            .await
            .with_context(|| format!("delivering mail to {to}"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.send_with_type(to, subject, body, ContentType::TEXT_PLAIN)
            .await
    }

    async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        self.send_with_type(to, subject, html, ContentType::TEXT_HTML)
            .await
    }
}
