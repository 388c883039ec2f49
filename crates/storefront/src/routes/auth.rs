//! Authentication route handlers.
//!
//! Passwordless sign-in: the customer enters an e-mail address, receives a
//! one-time code, and trades the code for a backend session. Both steps are
//! HTMX forms swapping the panel on the sign-in page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use guoyan_core::Email;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::NavContext;
use crate::backend::BackendError;
use crate::backend::types::parse_email;
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::htmx::{HxRedirect, safe_next};
use crate::middleware::{OptionalAuth, clear_current_customer, set_current_customer};
use crate::models::CurrentCustomer;
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// E-mail form data.
#[derive(Debug, Deserialize)]
pub struct SendCodeForm {
    pub email: String,
    #[serde(default)]
    pub next: Option<String>,
}

/// Code form data.
#[derive(Deserialize)]
pub struct VerifyCodeForm {
    pub email: String,
    pub code: SecretString,
    #[serde(default)]
    pub next: Option<String>,
}

/// Query parameters of the sign-in page.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub next: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Sign-in page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub nav: NavContext,
    pub email: String,
    pub next: String,
    pub error: Option<String>,
}

/// E-mail step of the sign-in panel.
#[derive(Template, WebTemplate)]
#[template(path = "partials/otp_request.html")]
pub struct OtpRequestTemplate {
    pub email: String,
    pub next: String,
    pub error: Option<String>,
}

/// Code step of the sign-in panel.
#[derive(Template, WebTemplate)]
#[template(path = "partials/otp_verify.html")]
pub struct OtpVerifyTemplate {
    pub email: String,
    pub next: String,
    pub error: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the sign-in page. Signed-in customers go straight to `next`.
#[instrument(skip(session, customer))]
pub async fn login_page(
    session: Session,
    OptionalAuth(customer): OptionalAuth,
    Query(query): Query<LoginQuery>,
) -> Response {
    let next = safe_next(query.next.as_deref());
    if customer.is_some() {
        return Redirect::to(&next).into_response();
    }

    LoginTemplate {
        nav: NavContext::load(&session, None).await,
        email: String::new(),
        next,
        error: None,
    }
    .into_response()
}

/// E-mail a sign-in code (HTMX).
#[instrument(skip(state, form))]
pub async fn send_code(State(state): State<AppState>, Form(form): Form<SendCodeForm>) -> Response {
    let next = safe_next(form.next.as_deref());

    let Ok(email) = Email::parse(&form.email) else {
        return OtpRequestTemplate {
            email: form.email,
            next,
            error: Some("请输入有效的邮箱地址".to_string()),
        }
        .into_response();
    };

    let redirect_to = format!(
        "{}/auth/login",
        state.config().base_url.trim_end_matches('/')
    );
    match state.backend().send_otp(&email, Some(&redirect_to)).await {
        Ok(()) => {
            tracing::info!(email = %email, "Sign-in code sent");
            OtpVerifyTemplate {
                email: email.into_inner(),
                next,
                error: None,
            }
            .into_response()
        }
        Err(e) => {
            let message = match &e {
                BackendError::Api { status: 429, .. } => "请求过于频繁，请稍后再试",
                _ => "发送失败，请稍后再试",
            };
            tracing::warn!(error = %e, email = %email, "Failed to send sign-in code");
            OtpRequestTemplate {
                email: email.into_inner(),
                next,
                error: Some(message.to_string()),
            }
            .into_response()
        }
    }
}

/// Verify the code and start the session (HTMX).
#[instrument(skip(state, session, form))]
pub async fn verify_code(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<VerifyCodeForm>,
) -> Response {
    let next = safe_next(form.next.as_deref());
    let retry = |email: String, next: String| {
        OtpVerifyTemplate {
            email,
            next,
            error: Some("验证码无效或已过期".to_string()),
        }
        .into_response()
    };

    let Ok(email) = Email::parse(&form.email) else {
        return retry(form.email, next);
    };

    let auth = match state
        .backend()
        .verify_otp(&email, form.code.expose_secret())
        .await
    {
        Ok(auth) => auth,
        Err(e) => {
            tracing::warn!(error = %e, email = %email, "Sign-in code rejected");
            return retry(email.into_inner(), next);
        }
    };

    let customer = CurrentCustomer {
        id: auth.user.id,
        email: parse_email(auth.user.email.as_deref()).unwrap_or(email),
        expires_at: auth.expiry(Utc::now()),
        access_token: auth.access_token,
    };

    if let Err(e) = set_current_customer(&session, &customer).await {
        tracing::error!(error = %e, "Failed to store signed-in customer");
        return OtpVerifyTemplate {
            email: customer.email.into_inner(),
            next,
            error: Some("登录失败，请稍后再试".to_string()),
        }
        .into_response();
    }

    set_sentry_user(&customer.id, Some(customer.email.as_str()));
    add_breadcrumb("auth", "Signed in", None);
    tracing::info!(user_id = %customer.id, "Customer signed in");

    (HxRedirect(next), ()).into_response()
}

/// Sign out.
///
/// The local session is cleared even when the backend cannot be reached.
#[instrument(skip(state, session, customer))]
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
) -> Redirect {
    if let Some(customer) = customer {
        if let Err(e) = state.backend().sign_out(&customer.access_token).await {
            tracing::warn!(error = %e, "Backend sign-out failed");
        }
        tracing::info!(user_id = %customer.id, "Customer signed out");
    }

    if let Err(e) = clear_current_customer(&session).await {
        tracing::error!(error = %e, "Failed to clear session customer");
    }
    clear_sentry_user();

    Redirect::to("/")
}
