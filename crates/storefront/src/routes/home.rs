//! Product list (home page).

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Query, State};
use guoyan_core::catalog::{Product, ProductQuery, ProductSort};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::NavContext;
use crate::error::Result;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::state::AppState;

/// Listing layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

/// Query string of the listing page.
#[derive(Debug, Default, Deserialize)]
pub struct ListingParams {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
    #[serde(default)]
    pub view: ViewMode,
}

/// Product card display data.
#[derive(Clone)]
pub struct ProductCard {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub image_url: String,
    pub price: String,
    pub original_price: Option<String>,
    pub discount: Option<u32>,
    pub rating: Option<String>,
    pub in_stock: bool,
}

impl From<&Product> for ProductCard {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name.clone(),
            brand: product.brand.clone(),
            image_url: product.image_url.clone(),
            price: product.price_money().display(),
            original_price: product
                .original_price
                .filter(|_| product.discount_percent().is_some())
                .map(|p| guoyan_core::Money::usd(p).display()),
            discount: product.discount_percent(),
            rating: product.rating.map(|r| format!("{r:.1}")),
            in_stock: product.in_stock,
        }
    }
}

/// A sort option for the select box.
pub struct SortOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub nav: NavContext,
    pub products: Vec<ProductCard>,
    pub search: String,
    pub sort_options: Vec<SortOption>,
    pub list_view: bool,
    pub total: usize,
}

/// Display the product list.
#[instrument(skip(state, session, customer))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
    Query(params): Query<ListingParams>,
) -> Result<HomeTemplate> {
    let all = state.backend().list_products().await?;

    let query = ProductQuery {
        search: params.search.clone(),
        sort: params.sort,
    };
    let products: Vec<ProductCard> = query.apply(&all).iter().map(ProductCard::from).collect();

    let sort_options = ProductSort::ALL
        .iter()
        .map(|&(sort, value, label)| SortOption {
            value,
            label,
            selected: sort == params.sort,
        })
        .collect();

    Ok(HomeTemplate {
        nav: NavContext::load(&session, customer.as_ref()).await,
        total: products.len(),
        products,
        search: params.search.unwrap_or_default(),
        sort_options,
        list_view: params.view == ViewMode::List,
    })
}
