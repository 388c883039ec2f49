//! Session cart endpoints, all driven by HTMX.
//!
//! Every mutation answers with an `HX-Trigger: cart-updated` event carrying
//! the new unit count, so the navigation badge and the checkout summary
//! refresh themselves. Quantity changes and removals return no markup of
//! their own.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use guoyan_core::ProductId;
use guoyan_core::cart::CartAction;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::htmx::Triggers;
use crate::services::CartStore;
use crate::state::AppState;

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: String,
    pub quantity: Option<u32>,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: String,
    pub quantity: i64,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub product_id: String,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

/// Confirmation shown next to the add-to-cart button.
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_added.html")]
pub struct CartAddedTemplate {
    pub name: String,
    pub quantity: u32,
}

fn parse_product_id(raw: &str) -> Result<ProductId> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid product id: {raw}")))
}

/// Add item to cart (HTMX).
///
/// The product is re-read from the catalog so the stored price is current.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let product_id = parse_product_id(&form.product_id)?;
    let quantity = form.quantity.unwrap_or(1).max(1);
    let product = state.backend().get_product(product_id).await?;
    let name = product.name.clone();

    match CartStore::new(&session)
        .apply(CartAction::Add { product, quantity })
        .await
    {
        Ok((_, event)) => Ok((
            Triggers::new().cart_updated(event),
            CartAddedTemplate { name, quantity },
        )
            .into_response()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to add item to cart");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<span class=\"text-error\">加入购物车失败</span>"),
            )
                .into_response())
        }
    }
}

/// Apply a cart action and broadcast the new count.
async fn apply_action(session: &Session, action: CartAction) -> Result<Response> {
    let (_, event) = CartStore::new(session).apply(action).await?;
    Ok((Triggers::new().cart_updated(event), Html("")).into_response())
}

/// Update cart item quantity (HTMX). Zero or less removes the line.
#[instrument(skip(session))]
pub async fn update(session: Session, Form(form): Form<UpdateCartForm>) -> Result<Response> {
    let product_id = parse_product_id(&form.product_id)?;
    apply_action(
        &session,
        CartAction::SetQuantity {
            product_id,
            quantity: form.quantity,
        },
    )
    .await
}

/// Remove item from cart (HTMX).
#[instrument(skip(session))]
pub async fn remove(session: Session, Form(form): Form<RemoveFromCartForm>) -> Result<Response> {
    let product_id = parse_product_id(&form.product_id)?;
    apply_action(&session, CartAction::Remove { product_id }).await
}

/// Get cart count badge (HTMX).
#[instrument(skip(session))]
pub async fn count(session: Session) -> impl IntoResponse {
    let count = CartStore::new(&session)
        .load()
        .await
        .map(|cart| cart.unit_count())
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read cart");
            0
        });

    CartCountTemplate { count }
}
