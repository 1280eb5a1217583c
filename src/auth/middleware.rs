use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{read_cookie, Session};
use crate::server::AppState;

/// Let the request through only with a valid session cookie; otherwise
/// redirect to `/login`. The signed-in user is stored as a [`Session`]
/// request extension.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_name = &state.settings.session.cookie_name;
    let claims = read_cookie(request.headers(), cookie_name)
        .and_then(|token| match state.sessions.verify(&token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected session cookie");
                None
            }
        });

    match claims {
        Some(claims) => {
            request.extensions_mut().insert(Session::from(claims));
            next.run(request).await
        }
        None => (StatusCode::FOUND, [(header::LOCATION, "/login")]).into_response(),
    }
}
