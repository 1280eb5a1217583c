//! Outgoing mail transport.
//!
//! The dispatcher only depends on the [`MailTransport`] trait; the SMTP
//! implementation lives in [`smtp`].

mod smtp;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::template::InlineAttachment;

pub use smtp::SmtpTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("No SMTP connection available after {0:?}")]
    PoolTimeout(Duration),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

impl TransportError {
    /// Whether sending the same message again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::PoolTimeout(_) | TransportError::Smtp(_))
    }
}

/// A fully rendered message ready for delivery.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<InlineAttachment>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError>;
}
