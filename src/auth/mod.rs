//! Login through an external OpenID Connect provider and signed session
//! cookies.

mod cookies;
mod middleware;
mod oidc;
mod session;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::error::AppError;

pub use cookies::{clear_cookie, read_cookie, set_cookie};
pub use middleware::require_session;
pub use oidc::OidcProvider;
pub use session::{LoginState, SessionClaims, SessionCodec};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Failed to exchange authorization code: {0}")]
    TokenExchange(String),

    #[error("Failed to fetch user info: {0}")]
    UserInfo(String),

    #[error("Login state not found")]
    MissingState,

    #[error("State mismatch")]
    StateMismatch,

    #[error("Code not found in request")]
    MissingCode,

    #[error("{0}")]
    Session(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingState | AuthError::StateMismatch | AuthError::MissingCode => {
                AppError::Validation(err.to_string())
            }
            AuthError::Session(msg) => AppError::Auth(msg),
            AuthError::Provider(_) | AuthError::TokenExchange(_) | AuthError::UserInfo(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

/// Who signed in, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub email: String,
    pub name: String,
}

/// The authenticated user of the current request, set by [`require_session`].
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub email: String,
    pub name: String,
}

impl From<SessionClaims> for Session {
    fn from(claims: SessionClaims) -> Self {
        Self {
            email: claims.sub,
            name: claims.name,
        }
    }
}

/// Where to send the browser to sign in, plus what must be remembered until
/// the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub pkce_verifier: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorization_request(&self) -> AuthorizationRequest;

    /// Exchange an authorization code for the signed-in identity.
    async fn exchange(&self, code: &str, pkce_verifier: &str) -> Result<Identity, AuthError>;
}
