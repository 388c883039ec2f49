//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                              - Product list (search, sort, grid/list)
//! GET  /products/{id}                 - Product detail + related products
//!
//! # Cart (HTMX fragments)
//! GET  /cart/count                    - Cart count badge (fragment)
//! POST /cart/add                      - Add to cart (triggers cart-updated)
//! POST /cart/update                   - Set quantity, <= 0 removes (triggers cart-updated)
//! POST /cart/remove                   - Remove line (triggers cart-updated)
//!
//! # Checkout
//! GET  /checkout                      - Cart, address and payment method
//! GET  /checkout/summary              - Summary fragment (re-read on cart-updated)
//! POST /checkout/pay                  - Place the order
//!
//! # Orders (requires auth)
//! GET  /orders                        - Order history, WeChat Pay QR modal
//! POST /orders/{id}/pay               - Resume payment of a pending order
//! GET  /orders/wechat-pay/countdown   - QR modal countdown (fragment)
//! POST /orders/wechat-pay/close       - Close the QR modal
//!
//! # Addresses (requires auth)
//! GET  /addresses                     - Address list
//! GET  /addresses/new                 - New address form
//! GET  /addresses/provinces           - Province options for a country (fragment)
//! POST /addresses                     - Create
//! GET  /addresses/{id}/edit           - Edit form
//! POST /addresses/{id}                - Update
//! POST /addresses/{id}/default        - Make default
//! POST /addresses/{id}/delete         - Delete
//!
//! # Auth
//! GET  /auth/login                    - Sign-in page
//! POST /auth/otp                      - E-mail a sign-in code (rate limited)
//! POST /auth/verify                   - Verify the code, start the session (rate limited)
//! POST /auth/logout                   - Sign out
//!
//! # Other
//! GET  /profile                       - Account page (requires auth)
//! GET  /contact                       - Contact and manual payment instructions
//! GET  /health, /health/ready         - Liveness, backend readiness
//! *                                   - 404 page
//! ```

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod contact;
pub mod home;
pub mod not_found;
pub mod orders;
pub mod products;
pub mod profile;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tower_sessions::Session;

use crate::config::StorefrontConfig;
use crate::models::CurrentCustomer;
use crate::services::CartStore;
use crate::state::AppState;

/// Data every page's navigation bar needs.
#[derive(Debug, Clone, Default)]
pub struct NavContext {
    /// Signed-in customer's e-mail.
    pub email: Option<String>,
    pub cart_count: u32,
}

impl NavContext {
    /// Build the navigation context for a page render.
    pub async fn load(session: &Session, customer: Option<&CurrentCustomer>) -> Self {
        let cart_count = CartStore::new(session)
            .load()
            .await
            .map(|cart| cart.unit_count())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to read cart for nav");
                0
            });

        Self {
            email: customer.map(|c| c.email.to_string()),
            cart_count,
        }
    }
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/count", get(cart::count))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/summary", get(checkout::summary))
        .route("/pay", post(checkout::pay))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}/pay", post(orders::resume))
        .route("/wechat-pay/countdown", get(orders::countdown))
        .route("/wechat-pay/close", post(orders::close_wechat_pay))
}

/// Create the address routes router.
pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(addresses::index).post(addresses::create))
        .route("/new", get(addresses::new))
        .route("/provinces", get(addresses::provinces))
        .route("/{id}", post(addresses::update))
        .route("/{id}/edit", get(addresses::edit))
        .route("/{id}/default", post(addresses::set_default))
        .route("/{id}/delete", post(addresses::delete))
}

/// Create the auth routes router.
///
/// The e-mail endpoints are rate limited when configured.
pub fn auth_routes(config: &StorefrontConfig) -> Router<AppState> {
    let mut otp = Router::new()
        .route("/otp", post(auth::send_code))
        .route("/verify", post(auth::verify_code));

    if config.rate_limit_otp {
        match crate::middleware::otp_rate_limiter() {
            Some(limiter) => otp = otp.route_layer(limiter),
            None => tracing::error!("OTP rate limiter configuration rejected"),
        }
    }

    Router::new()
        .route("/login", get(auth::login_page))
        .route("/logout", post(auth::logout))
        .merge(otp)
}

/// Create all routes for the storefront.
pub fn routes(config: &StorefrontConfig) -> Router<AppState> {
    Router::new()
        .route("/", get(home::index))
        .route("/products/{id}", get(products::show))
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/orders", order_routes())
        .nest("/addresses", address_routes())
        .nest("/auth", auth_routes(config))
        .route("/profile", get(profile::show))
        .route("/contact", get(contact::show))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .fallback(not_found::fallback)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the backend's auth API is unreachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.backend().health().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Backend not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
