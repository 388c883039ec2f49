//! Products and catalog listing queries.
//!
//! Products are read-only from the storefront's point of view. Searching and
//! sorting happen on the fetched list; the catalog is small enough that the
//! backend returns it whole.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::types::{Money, ProductId};

/// A product as stored in the `products` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub image_url: String,
    /// Price in US dollars.
    pub price: Decimal,
    /// Pre-discount price, shown struck through when higher than `price`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    pub brand: String,
    /// Advisory only; nothing is reserved.
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

const fn default_in_stock() -> bool {
    true
}

impl Product {
    /// Price as displayable money.
    #[must_use]
    pub const fn price_money(&self) -> Money {
        Money::usd(self.price)
    }

    /// Whole-percent discount against `original_price`, if any.
    #[must_use]
    pub fn discount_percent(&self) -> Option<u32> {
        let original = self.original_price?;
        if original <= self.price || original <= Decimal::ZERO {
            return None;
        }
        let percent = ((original - self.price) / original * Decimal::ONE_HUNDRED).round();
        percent.to_u32()
    }
}

/// Sort orders offered on the listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductSort {
    /// Backend order.
    #[default]
    Featured,
    PriceAsc,
    PriceDesc,
    Name,
    /// Highest rated first; unrated products last.
    Rating,
}

impl ProductSort {
    /// Every sort with its wire value and label.
    pub const ALL: [(Self, &'static str, &'static str); 5] = [
        (Self::Featured, "featured", "推荐"),
        (Self::PriceAsc, "price-asc", "价格从低到高"),
        (Self::PriceDesc, "price-desc", "价格从高到低"),
        (Self::Name, "name", "名称"),
        (Self::Rating, "rating", "评分"),
    ];

    fn compare(self, a: &Product, b: &Product) -> Ordering {
        match self {
            Self::Featured => Ordering::Equal,
            Self::PriceAsc => a.price.cmp(&b.price),
            Self::PriceDesc => b.price.cmp(&a.price),
            Self::Name => a.name.cmp(&b.name),
            Self::Rating => {
                let a = a.rating.unwrap_or(f32::MIN);
                let b = b.rating.unwrap_or(f32::MIN);
                b.total_cmp(&a)
            }
        }
    }
}

/// Listing query: free-text search plus sort order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
}

impl ProductQuery {
    /// Filter and sort a product list.
    ///
    /// Search is a case-insensitive substring match on name or brand. Sorting
    /// is stable, so ties keep backend order.
    #[must_use]
    pub fn apply(&self, products: &[Product]) -> Vec<Product> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matched: Vec<Product> = products
            .iter()
            .filter(|p| {
                needle.as_ref().is_none_or(|n| {
                    p.name.to_lowercase().contains(n) || p.brand.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| self.sort.compare(a, b));
        matched
    }
}
