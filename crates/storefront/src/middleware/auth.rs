//! Authentication extractors.
//!
//! The signed-in customer is a [`CurrentCustomer`] in the session. A customer
//! whose access token has expired counts as signed out.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tower_sessions::Session;

use crate::models::{CurrentCustomer, session_keys};

/// Extractor that requires a signed-in customer.
///
/// If nobody is signed in, redirects to the sign-in page with a `next`
/// parameter pointing back at the requested page.
///
/// # Example
///
/// ```rust,ignore
/// async fn orders(RequireAuth(customer): RequireAuth) -> impl IntoResponse {
///     format!("Orders for {}", customer.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentCustomer);

/// Rejection when a customer is required but none is signed in.
pub enum AuthRejection {
    /// Redirect to the sign-in page, returning to `next` afterwards.
    RedirectToLogin { next: String, htmx: bool },
    /// The session layer is missing.
    NoSession,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin { next, htmx } => {
                let target = format!("/auth/login?next={}", urlencoding::encode(&next));
                // XHR follows a 303 silently, so HTMX needs the header instead
                if htmx {
                    ([("HX-Redirect", target)], StatusCode::OK).into_response()
                } else {
                    Redirect::to(&target).into_response()
                }
            }
            Self::NoSession => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Read the customer from the session, dropping an expired identity.
async fn session_customer(session: &Session) -> Option<CurrentCustomer> {
    let customer: CurrentCustomer = session
        .get(session_keys::CURRENT_CUSTOMER)
        .await
        .ok()
        .flatten()?;

    if customer.is_expired(Utc::now()) {
        tracing::debug!(user_id = %customer.id, "Session customer expired");
        if let Err(e) = clear_current_customer(session).await {
            tracing::warn!(error = %e, "Failed to clear expired customer");
        }
        return None;
    }

    Some(customer)
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::NoSession)?;

        let htmx = parts.headers.contains_key("hx-request");
        let next = if htmx {
            // The page the fragment was requested from
            parts
                .headers
                .get("hx-current-url")
                .and_then(|v| v.to_str().ok())
                .and_then(|url| url::Url::parse(url).ok())
                .map_or_else(|| "/".to_string(), |url| url.path().to_string())
        } else {
            parts
                .uri
                .path_and_query()
                .map_or_else(|| "/".to_string(), ToString::to_string)
        };

        session_customer(session)
            .await
            .map(Self)
            .ok_or(AuthRejection::RedirectToLogin { next, htmx })
    }
}

/// Extractor that optionally gets the current customer.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is
/// signed in.
pub struct OptionalAuth(pub Option<CurrentCustomer>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let customer = match parts.extensions.get::<Session>() {
            Some(session) => session_customer(session).await,
            None => None,
        };

        Ok(Self(customer))
    }
}

/// Store the signed-in customer in the session.
///
/// The session ID is cycled to prevent fixation.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_customer(
    session: &Session,
    customer: &CurrentCustomer,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session
        .insert(session_keys::CURRENT_CUSTOMER, customer)
        .await
}

/// Remove the customer from the session (sign out).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_customer(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentCustomer>(session_keys::CURRENT_CUSTOMER)
        .await?;
    Ok(())
}
