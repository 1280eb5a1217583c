use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::storage::StorageError;
use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

/// Message shown to clients for server-side failures.
fn redacted(log_msg: &str, public: &str) -> String {
    if is_production() {
        public.to_string()
    } else {
        log_msg.to_string()
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String, String) {
        match self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = redacted(&log_msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Template(e) => {
                let msg = e.to_string();
                match e {
                    TemplateError::NotFound(_) => {
                        (StatusCode::NOT_FOUND, "TEMPLATE_NOT_FOUND", msg.clone(), msg)
                    }
                    TemplateError::Parse { .. } => {
                        (StatusCode::BAD_REQUEST, "TEMPLATE_PARSE_ERROR", msg.clone(), msg)
                    }
                    TemplateError::Render { .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "TEMPLATE_RENDER_ERROR",
                        msg.clone(),
                        msg,
                    ),
                    TemplateError::Transform(_) => {
                        let client_msg = redacted(&msg, "Failed to inline styles");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "TRANSFORM_ERROR",
                            client_msg,
                            msg,
                        )
                    }
                }
            }
            AppError::Storage(e) => {
                let msg = e.to_string();
                match e {
                    StorageError::InvalidName(_) => {
                        (StatusCode::BAD_REQUEST, "INVALID_NAME", msg.clone(), msg)
                    }
                    StorageError::NotFound(_) => {
                        (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), msg)
                    }
                    StorageError::Io { .. } => {
                        let client_msg = redacted(&msg, "Storage error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", client_msg, msg)
                    }
                }
            }
            AppError::Directory(e) => {
                let log_msg = e.to_string();
                let client_msg = redacted(&log_msg, "Directory service unavailable");
                (StatusCode::BAD_GATEWAY, "DIRECTORY_ERROR", client_msg, log_msg)
            }
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = redacted(&log_msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, log_msg)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = self.parts();

        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::debug!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
