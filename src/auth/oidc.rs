//! OpenID Connect login against the configured identity provider.

use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use openidconnect::{core::CoreProviderMetadata, IssuerUrl};
use serde::Deserialize;
use thiserror::Error;

use super::{AuthError, AuthorizationRequest, Identity, IdentityProvider};
use crate::config::OidcConfig;

// BasicClient with auth and token endpoints set
type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Http(#[from] http::Error),
}

/// Async HTTP client for OAuth2 and discovery requests
async fn async_http_client(
    request: oauth2::HttpRequest,
) -> Result<oauth2::HttpResponse, HttpClientError> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let method = request.method().clone();
    let url = request.uri().to_string();
    let headers = request.headers().clone();
    let body = request.into_body();

    let mut request_builder = client.request(method, &url).body(body);
    for (name, value) in &headers {
        request_builder = request_builder.header(name.as_str(), value.as_bytes());
    }

    let response = request_builder.send().await?;

    let status_code = response.status();
    let headers = response.headers().to_owned();
    let body = response.bytes().await?.to_vec();

    let mut builder = http::Response::builder().status(status_code);
    for (name, value) in &headers {
        builder = builder.header(name, value);
    }
    Ok(builder.body(body)?)
}

/// Generic OpenID Connect provider (Authentik in production)
pub struct OidcProvider {
    client: ConfiguredClient,
    userinfo_url: String,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl OidcProvider {
    /// Discover the provider's endpoints from its issuer URL.
    pub async fn discover(config: &OidcConfig) -> Result<Self, AuthError> {
        let issuer_url = IssuerUrl::new(config.issuer_url.clone())
            .map_err(|e| AuthError::Provider(format!("Invalid issuer URL: {}", e)))?;

        let metadata = CoreProviderMetadata::discover_async(issuer_url, &async_http_client)
            .await
            .map_err(|e| AuthError::Provider(format!("Failed to discover provider: {}", e)))?;

        let userinfo_url = metadata
            .userinfo_endpoint()
            .ok_or_else(|| AuthError::Provider("Provider has no userinfo endpoint".to_string()))?
            .to_string();
        let auth_url = metadata.authorization_endpoint().to_string();
        let token_url = metadata
            .token_endpoint()
            .ok_or_else(|| AuthError::Provider("Provider has no token endpoint".to_string()))?
            .to_string();

        tracing::info!(issuer = %config.issuer_url, "OIDC provider discovered");
        Self::with_endpoints(config, &auth_url, &token_url, &userinfo_url)
    }

    /// Build a provider from explicit endpoints.
    pub fn with_endpoints(
        config: &OidcConfig,
        auth_url: &str,
        token_url: &str,
        userinfo_url: &str,
    ) -> Result<Self, AuthError> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(auth_url.to_string())
                    .map_err(|e| AuthError::Provider(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(token_url.to_string())
                    .map_err(|e| AuthError::Provider(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_url.clone())
                    .map_err(|e| AuthError::Provider(format!("Invalid redirect URL: {}", e)))?,
            );

        let mut scopes: Vec<String> = ["openid", "profile", "email"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for scope in &config.scopes {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }

        Ok(Self {
            client,
            userinfo_url: userinfo_url.to_string(),
            scopes,
            http: reqwest::Client::new(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    name: Option<String>,
    preferred_username: Option<String>,
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: url.to_string(),
            state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    #[tracing::instrument(name = "oidc.exchange", skip_all)]
    async fn exchange(&self, code: &str, pkce_verifier: &str) -> Result<Identity, AuthError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&async_http_client)
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .map_err(|e| AuthError::UserInfo(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::UserInfo(format!("HTTP {}", response.status())));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::UserInfo(format!("Failed to parse JSON: {}", e)))?;

        let email = info
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AuthError::UserInfo("Identity has no email claim".to_string()))?;
        let name = info
            .name
            .or(info.preferred_username)
            .unwrap_or_else(|| email.clone());

        Ok(Identity { email, name })
    }
}
