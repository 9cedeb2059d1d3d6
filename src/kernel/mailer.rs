//! Mail Sender collaborator (spec §4.6 Alert Fanout): delivers the failure
//! alert composed by `alert::fanout` to its recipients.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, SchedulerError};

/// `send_email(subject, to, body)` contract (spec §4.6).
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_email(&self, subject: &str, to: &[String], body: &str) -> Result<()>;
}

/// SMTP-backed sender built on `lettre`'s async Tokio transport.
pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailSender {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.smtp_from.clone(),
        })
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send_email(&self, subject: &str, to: &[String], body: &str) -> Result<()> {
        if to.is_empty() {
            return Ok(());
        }

        for recipient in to {
            let message = Message::builder()
                .from(
                    self.from
                        .parse()
                        .map_err(|e| SchedulerError::InvalidEmail(format!("{}: {e}", self.from)))?,
                )
                .to(recipient
                    .parse()
                    .map_err(|e| SchedulerError::InvalidEmail(format!("{recipient}: {e}")))?)
                .subject(subject)
                .header(ContentType::TEXT_PLAIN)
                .body(body.to_string())
                .map_err(|e| SchedulerError::Mail(e.to_string()))?;

            self.transport
                .send(message)
                .await
                .map_err(|e| SchedulerError::Mail(e.to_string()))?;

            info!(%recipient, %subject, "alert email sent");
        }

        Ok(())
    }
}

/// Test/offline double: logs instead of sending. Used when SMTP credentials
/// are not configured (spec §9 allows alerting to be a no-op collaborator).
pub struct NullMailSender;

#[async_trait]
impl MailSender for NullMailSender {
    async fn send_email(&self, subject: &str, to: &[String], _body: &str) -> Result<()> {
        warn!(?to, %subject, "NullMailSender: email suppressed");
        Ok(())
    }
}
