use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{AuthError, Identity};
use crate::config::SessionConfig;

const SESSION_AUDIENCE: &str = "mail-manager:session";
const LOGIN_AUDIENCE: &str = "mail-manager:login";

/// Lifetime of the state kept between `/login` and the callback
const LOGIN_STATE_TTL_SECONDS: i64 = 600;

/// Claims carried by the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Email of the signed-in user
    pub sub: String,
    pub name: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn email(&self) -> &str {
        &self.sub
    }
}

/// CSRF state and PKCE verifier of a login in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginState {
    pub state: String,
    pub pkce_verifier: String,
    pub aud: String,
    pub exp: i64,
}

/// Signs and verifies the session and login-state cookies (HS256).
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    max_age_seconds: u64,
}

impl SessionCodec {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.key.as_bytes()),
            max_age_seconds: config.max_age_seconds,
        }
    }

    pub fn max_age_seconds(&self) -> u64 {
        self.max_age_seconds
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sub: identity.email.clone(),
            name: identity.name.clone(),
            aud: SESSION_AUDIENCE.to_string(),
            iat: now,
            exp: now + self.max_age_seconds as i64,
        };
        self.sign(&claims)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        self.decode(token, SESSION_AUDIENCE)
    }

    pub fn issue_login_state(&self, state: &str, pkce_verifier: &str) -> Result<String, AuthError> {
        let claims = LoginState {
            state: state.to_string(),
            pkce_verifier: pkce_verifier.to_string(),
            aud: LOGIN_AUDIENCE.to_string(),
            exp: chrono::Utc::now().timestamp() + LOGIN_STATE_TTL_SECONDS,
        };
        self.sign(&claims)
    }

    pub fn verify_login_state(&self, token: &str) -> Result<LoginState, AuthError> {
        self.decode(token, LOGIN_AUDIENCE)
    }

    pub fn login_state_ttl(&self) -> u64 {
        LOGIN_STATE_TTL_SECONDS as u64
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Session(format!("Failed to sign token: {}", e)))
    }

    fn decode<T: DeserializeOwned>(&self, token: &str, audience: &str) -> Result<T, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::Session(format!("Invalid token: {}", e)))
    }
}
