//! API layer - HTTP endpoint handlers organized by domain.

mod email;
mod health;
mod images;
mod metrics;
mod routes;
mod session;
mod templates;
mod users;

pub use email::{send_email, SendEmailRequest, SendEmailResponse};
pub use health::{health, HealthResponse};
pub use images::{delete_image, get_image, list_images, upload_image};
pub use metrics::prometheus_metrics;
pub use routes::{protected_routes, public_routes};
pub use session::{callback, login, logout, me, LOGIN_STATE_COOKIE};
pub use templates::{
    delete_template, get_template, list_templates, preview_template, save_template,
    DEFAULT_TEMPLATE,
};
pub use users::list_users;
