use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::sync::{Semaphore, SemaphorePermit};

use super::{MailTransport, OutgoingEmail, TransportError};
use crate::config::SmtpConfig;

/// SMTP delivery over a bounded connection pool.
///
/// At most `pool_size` sends are in flight; further sends wait up to
/// `pool_timeout_seconds` for a free connection and then fail with a
/// retryable [`TransportError::PoolTimeout`].
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    slots: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| TransportError::InvalidAddress(config.from.clone()))?;

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Smtp(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        let transport = builder
            .port(config.port)
            .pool_config(PoolConfig::new().max_size(config.pool_size))
            .build();

        tracing::info!(
            host = %config.host,
            port = config.port,
            pool_size = config.pool_size,
            tls = config.use_tls,
            "SMTP transport configured"
        );

        Ok(Self {
            transport,
            from,
            slots: Arc::new(Semaphore::new(config.pool_size as usize)),
            acquire_timeout: Duration::from_secs(config.pool_timeout_seconds),
        })
    }

    /// Build a `multipart/related` message: the HTML body followed by one
    /// inline part per attachment.
    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, TransportError> {
        let mut builder = Message::builder().from(self.from.clone());
        for to in &email.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|_| TransportError::InvalidAddress(to.clone()))?;
            builder = builder.to(mailbox);
        }

        let mut body = MultiPart::related().singlepart(SinglePart::html(email.html.clone()));
        for attachment in &email.attachments {
            let content_type = part_content_type(&attachment.content_type)?;
            body = body.singlepart(
                Attachment::new_inline_with_name(
                    attachment.content_id.clone(),
                    attachment.filename.clone(),
                )
                .body(attachment.data.clone(), content_type),
            );
        }

        builder
            .subject(email.subject.clone())
            .multipart(body)
            .map_err(|e| TransportError::Build(e.to_string()))
    }

    /// Wait for a free pool slot, giving up after `acquire_timeout`.
    async fn acquire_slot(&self) -> Result<SemaphorePermit<'_>, TransportError> {
        tokio::time::timeout(self.acquire_timeout, self.slots.acquire())
            .await
            .map_err(|_| TransportError::PoolTimeout(self.acquire_timeout))?
            .map_err(|e| TransportError::Smtp(e.to_string()))
    }
}

/// `image/<ext>` with an empty type or subtype is sent as
/// `application/octet-stream`.
fn part_content_type(raw: &str) -> Result<ContentType, TransportError> {
    let well_formed = matches!(
        raw.split_once('/'),
        Some((kind, subtype)) if !kind.trim().is_empty() && !subtype.trim().is_empty()
    );

    let parsed = if well_formed {
        ContentType::parse(raw).ok()
    } else {
        None
    };

    match parsed {
        Some(content_type) => Ok(content_type),
        None => ContentType::parse("application/octet-stream")
            .map_err(|e| TransportError::Build(e.to_string())),
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    #[tracing::instrument(
        name = "smtp.send",
        skip(self, email),
        fields(recipients = email.to.len(), attachments = email.attachments.len())
    )]
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let message = self.build_message(email)?;

        let _permit = self.acquire_slot().await?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        tracing::debug!(code = %response.code(), "SMTP accepted message");
        Ok(())
    }
}
