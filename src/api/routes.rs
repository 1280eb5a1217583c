use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::require_session;
use crate::server::AppState;

use super::email::send_email;
use super::health::health;
use super::images::{delete_image, get_image, list_images, upload_image};
use super::metrics::prometheus_metrics;
use super::session::{callback, login, logout, me};
use super::templates::{
    delete_template, get_template, list_templates, preview_template, save_template,
};
use super::users::list_users;

/// Routes reachable without a session
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/login", get(login))
        .route("/login/callback", get(callback))
        .route("/logout", post(logout))
}

/// `/api` routes; requests without a valid session are redirected to `/login`
pub fn protected_routes(state: &AppState) -> Router<AppState> {
    let upload_limit = state.settings.server.max_upload_bytes;

    Router::new()
        .nest(
            "/api",
            Router::new()
                .route("/me", get(me))
                .route("/users", get(list_users))
                .route("/templates", get(list_templates))
                .route(
                    "/templates/{name}",
                    get(get_template).post(save_template).delete(delete_template),
                )
                .route("/templates/preview/{name}", post(preview_template))
                .route("/email", post(send_email))
                .route(
                    "/images",
                    get(list_images)
                        .post(upload_image)
                        .layer(DefaultBodyLimit::max(upload_limit)),
                )
                .route("/images/{name}", get(get_image).delete(delete_image)),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ))
}
