//! Bulk send endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::template::{Recipient, TemplateError};

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, rename = "recipient")]
    pub recipients: Vec<Recipient>,
}

#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    pub message: String,
    pub accepted: usize,
    pub batch_id: Uuid,
}

/// POST /api/email - Queue one message per recipient
///
/// Returns as soon as the delivery tasks are scheduled; delivery failures are
/// only visible in logs and metrics.
#[tracing::instrument(
    name = "http.send_email",
    skip(state, request),
    fields(template = %request.template, recipient_count = request.recipients.len())
)]
pub async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<SendEmailRequest>,
) -> Result<(StatusCode, Json<SendEmailResponse>)> {
    if request.template.is_empty() {
        return Err(AppError::Validation("Template is required".to_string()));
    }
    if request.subject.is_empty() {
        return Err(AppError::Validation("Subject is required".to_string()));
    }
    if request.recipients.is_empty() {
        return Err(AppError::Validation(
            "At least one recipient is required".to_string(),
        ));
    }
    if let Some(r) = request.recipients.iter().find(|r| r.email.trim().is_empty()) {
        return Err(AppError::Validation(format!(
            "Recipient {} has no email address",
            r.name
        )));
    }
    if !state.templates.exists(&request.template) {
        return Err(TemplateError::NotFound(request.template).into());
    }

    let receipt = state
        .dispatcher
        .send(&request.template, &request.subject, request.recipients);

    Ok((
        StatusCode::ACCEPTED,
        Json(SendEmailResponse {
            message: "Emails are being sent".to_string(),
            accepted: receipt.accepted,
            batch_id: receipt.batch_id,
        }),
    ))
}
