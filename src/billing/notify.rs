use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;
use uuid::Uuid;

use crate::config;

/// key: billing-notify -> outbound client email boundary
///
/// The reconciler and service treat every send as best-effort: failures are
/// logged by the caller and never roll back a persisted state change.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_suspended(&self, website_id: Uuid, contact: &str) -> Result<()>;
    async fn send_overdue(&self, website_id: Uuid, contact: &str) -> Result<()>;
    async fn send_activated(&self, website_id: Uuid, contact: &str) -> Result<()>;
}

/// SMTP-backed gateway. Built from the `SMTP_*` environment when a relay
/// host is configured.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Returns `None` when `SMTP_HOST` is unset, so callers can fall back to
    /// the log-only gateway in development.
    pub fn from_env() -> Result<Option<Self>> {
        let Some(host) = config::SMTP_HOST.as_deref() else {
            return Ok(None);
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .context("failed to create SMTP transport")?
            .port(*config::SMTP_PORT);
        if let (Some(username), Some(password)) =
            (config::SMTP_USERNAME.clone(), config::SMTP_PASSWORD.clone())
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        let from: Mailbox = config::SMTP_FROM
            .parse()
            .context("SMTP_FROM is not a valid mailbox")?;

        Ok(Some(Self {
            transport: builder.build(),
            from,
        }))
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<()> {
        let to: Mailbox = to
            .parse()
            .with_context(|| format!("invalid recipient address: {to}"))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .context("failed to build notification email")?;
        self.transport
            .send(message)
            .await
            .context("SMTP send failed")?;
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for SmtpNotifier {
    async fn send_suspended(&self, website_id: Uuid, contact: &str) -> Result<()> {
        self.send(
            contact,
            "Your website has been suspended",
            format!(
                "Payment for website {website_id} was not received within the grace period, \
                 so the site has been suspended. Record a payment to restore access."
            ),
        )
        .await
    }

    async fn send_overdue(&self, website_id: Uuid, contact: &str) -> Result<()> {
        self.send(
            contact,
            "Website payment overdue",
            format!(
                "The payment for website {website_id} is past its due date. \
                 The site remains online; please settle the open amount."
            ),
        )
        .await
    }

    async fn send_activated(&self, website_id: Uuid, contact: &str) -> Result<()> {
        self.send(
            contact,
            "Payment received",
            format!("Your payment for website {website_id} was recorded. Billing is active again."),
        )
        .await
    }
}

/// Log-only gateway used when no SMTP relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationGateway for LogNotifier {
    async fn send_suspended(&self, website_id: Uuid, contact: &str) -> Result<()> {
        info!(%website_id, contact, "notification: website suspended");
        Ok(())
    }

    async fn send_overdue(&self, website_id: Uuid, contact: &str) -> Result<()> {
        info!(%website_id, contact, "notification: payment overdue");
        Ok(())
    }

    async fn send_activated(&self, website_id: Uuid, contact: &str) -> Result<()> {
        info!(%website_id, contact, "notification: billing activated");
        Ok(())
    }
}
