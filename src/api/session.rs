//! OIDC login flow and the current-user endpoint.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{clear_cookie, read_cookie, set_cookie, AuthError, Session};
use crate::error::Result;
use crate::server::AppState;

/// Cookie holding the CSRF state and PKCE verifier between login and callback
pub const LOGIN_STATE_COOKIE: &str = "oidc-login";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
}

/// GET /login - Redirect to the identity provider
#[tracing::instrument(name = "http.login", skip(state))]
pub async fn login(State(state): State<AppState>) -> Result<Response> {
    let request = state.identity.authorization_request();
    let token = state
        .sessions
        .issue_login_state(&request.state, &request.pkce_verifier)?;

    let cookie = set_cookie(
        LOGIN_STATE_COOKIE,
        &token,
        state.sessions.login_state_ttl(),
        state.settings.session.secure,
    );

    Ok((
        StatusCode::FOUND,
        AppendHeaders([(header::SET_COOKIE, cookie), (header::LOCATION, request.url)]),
    )
        .into_response())
}

/// GET /login/callback - Finish the login and start a session
#[tracing::instrument(name = "http.login_callback", skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    let login = read_cookie(&headers, LOGIN_STATE_COOKIE)
        .and_then(|token| state.sessions.verify_login_state(&token).ok())
        .ok_or(AuthError::MissingState)?;

    if params.state.as_deref() != Some(login.state.as_str()) {
        return Err(AuthError::StateMismatch.into());
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::MissingCode)?;

    let identity = state.identity.exchange(&code, &login.pkce_verifier).await?;
    let token = state.sessions.issue(&identity)?;
    tracing::info!(email = %identity.email, "User signed in");

    let secure = state.settings.session.secure;
    Ok((
        StatusCode::FOUND,
        AppendHeaders([
            (
                header::SET_COOKIE,
                set_cookie(
                    &state.settings.session.cookie_name,
                    &token,
                    state.sessions.max_age_seconds(),
                    secure,
                ),
            ),
            (header::SET_COOKIE, clear_cookie(LOGIN_STATE_COOKIE, secure)),
            (header::LOCATION, "/".to_string()),
        ]),
    )
        .into_response())
}

/// POST /logout - Drop the session cookie
#[tracing::instrument(name = "http.logout", skip(state))]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = clear_cookie(
        &state.settings.session.cookie_name,
        state.settings.session.secure,
    );

    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(json!({ "message": "Logged out" })),
    )
}

/// GET /api/me - The signed-in user
pub async fn me(Extension(session): Extension<Session>) -> Json<Value> {
    Json(json!({ "email": session.email, "name": session.name }))
}
