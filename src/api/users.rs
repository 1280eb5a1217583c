//! Directory user listing.

use axum::{extract::State, Json};

use crate::directory::DirectoryUser;
use crate::error::Result;
use crate::server::AppState;

/// GET /api/users - Directory users, service accounts excluded
#[tracing::instrument(name = "http.list_users", skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<DirectoryUser>>> {
    let users = state.directory.list_users().await?;
    Ok(Json(users))
}
