//! Cache types for backend responses.

use guoyan_core::catalog::Product;
use guoyan_core::{ExchangeRates, ProductId};

use super::types::AuthUser;

/// Cache key for catalog reads, users and rates.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Products,
    Product(ProductId),
    Related(String),
    /// Keyed by access token.
    User(String),
    Rates,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Products(Vec<Product>),
    Product(Box<Product>),
    User(AuthUser),
    Rates(ExchangeRates),
}
