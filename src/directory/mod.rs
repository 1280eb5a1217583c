//! User directory backed by the Authentik core API.

mod authentik;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use authentik::AuthentikClient;

/// Authentik user type of machine accounts, hidden from listings
pub const SERVICE_ACCOUNT_TYPE: &str = "internal_service_account";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory is not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Directory returned HTTP {status}")]
    Status { status: u16 },

    #[error("User not found: {0}")]
    NotFound(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub pk: i64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(rename = "type", default)]
    pub user_type: String,
}

impl DirectoryUser {
    pub fn is_service_account(&self) -> bool {
        self.user_type == SERVICE_ACCOUNT_TYPE
    }
}

#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// All users except service accounts
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError>;

    async fn get_user(&self, pk: i64) -> Result<DirectoryUser, DirectoryError>;
}
