//! Product detail route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Path, State};
use guoyan_core::ProductId;
use tower_sessions::Session;
use tracing::instrument;

use super::NavContext;
use super::home::ProductCard;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::state::AppState;

/// Most related products shown under the detail.
const RELATED_LIMIT: usize = 4;

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/product.html")]
pub struct ProductTemplate {
    pub nav: NavContext,
    pub product: ProductCard,
    pub related: Vec<ProductCard>,
    pub quantities: Vec<u32>,
}

/// Display a product.
#[instrument(skip(state, session, customer))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
    Path(id): Path<String>,
) -> Result<ProductTemplate> {
    let id: ProductId = id
        .parse()
        .map_err(|_| AppError::NotFound(format!("product {id}")))?;
    let product = state.backend().get_product(id).await?;

    let related = match state.backend().related_products(&product.brand).await {
        Ok(products) => products
            .iter()
            .filter(|p| p.id != product.id)
            .take(RELATED_LIMIT)
            .map(ProductCard::from)
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, brand = %product.brand, "Related products unavailable");
            Vec::new()
        }
    };

    Ok(ProductTemplate {
        nav: NavContext::load(&session, customer.as_ref()).await,
        product: ProductCard::from(&product),
        related,
        quantities: (1..=10).collect(),
    })
}
