//! Account page.
//!
//! These routes require authentication.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;
use guoyan_core::address::default_address;
use tower_sessions::Session;
use tracing::instrument;

use super::NavContext;
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// Profile page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub nav: NavContext,
    pub email: String,
    pub member_since: Option<String>,
    pub last_sign_in: Option<String>,
    pub default_address: Option<String>,
    pub address_count: usize,
}

/// Display the signed-in customer's account.
///
/// The user record is re-read so a revoked token sends the customer back
/// through sign-in.
#[instrument(skip(state, session, customer))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
) -> Result<ProfileTemplate> {
    let user = state.backend().get_user(&customer.access_token).await?;
    let addresses = state
        .backend()
        .list_addresses(&customer.access_token, customer.id)
        .await?;

    Ok(ProfileTemplate {
        nav: NavContext::load(&session, Some(&customer)).await,
        email: user.email.unwrap_or_else(|| customer.email.to_string()),
        member_since: user.created_at.map(|t| t.format("%Y-%m-%d").to_string()),
        last_sign_in: user
            .last_sign_in_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string()),
        default_address: default_address(&addresses)
            .map(|a| format!("{} · {}", a.full_name, a.locality_line())),
        address_count: addresses.len(),
    })
}
