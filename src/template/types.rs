//! Template types and error definitions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Failed to parse template {name}: {reason}")]
    Parse { name: String, reason: String },

    #[error("Failed to render template {name}: {reason}")]
    Render { name: String, reason: String },

    #[error("Failed to inline CSS: {0}")]
    Transform(String),
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// A single email recipient as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    /// Display name
    pub name: String,

    /// Delivery address
    pub email: String,

    /// Free-form values read by the `property` directive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<HashMap<String, String>>,
}

/// Data a template is evaluated against. Built fresh for every recipient.
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext {
    pub name: String,
    pub email: String,
    pub year: i32,
    pub custom: HashMap<String, String>,
}

impl RenderContext {
    pub fn new(name: impl Into<String>, email: impl Into<String>, year: i32) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            year,
            custom: HashMap::new(),
        }
    }

    pub fn for_recipient(recipient: &Recipient, year: i32) -> Self {
        Self {
            name: recipient.name.clone(),
            email: recipient.email.clone(),
            year,
            custom: recipient.custom.clone().unwrap_or_default(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

/// An image embedded in the message body and referenced through `cid:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAttachment {
    /// Value of the Content-ID header, without angle brackets
    pub content_id: String,

    /// Attachment file name (same as the content id)
    pub filename: String,

    /// MIME type derived from the reference's extension
    pub content_type: String,

    pub data: Vec<u8>,
}

/// Output of one render: the HTML body and the images it references.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub html: String,
    pub attachments: Vec<InlineAttachment>,
}
