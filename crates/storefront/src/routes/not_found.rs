//! The 404 page, for unknown paths and for records that no longer exist.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use super::NavContext;
use crate::filters;
use crate::middleware::OptionalAuth;

/// Not-found page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/not_found.html")]
pub struct NotFoundTemplate {
    pub nav: NavContext,
}

impl NotFoundTemplate {
    /// Render the page with a 404 status.
    #[must_use]
    pub fn response(nav: NavContext) -> Response {
        (StatusCode::NOT_FOUND, Self { nav }).into_response()
    }
}

/// Router fallback.
pub async fn fallback(session: Session, OptionalAuth(customer): OptionalAuth) -> Response {
    tracing::debug!("No route matched");
    NotFoundTemplate::response(NavContext::load(&session, customer.as_ref()).await)
}
