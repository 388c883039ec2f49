//! Orders as read back from the backend, and order-list pagination.
//!
//! Orders are created by the payment functions, never by the storefront
//! directly. The storefront reads them with embedded items, product snapshots
//! and the shipping address.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{
    AddressId, CurrencyCode, Money, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId,
};

/// Orders shown per page on the order history.
pub const ORDERS_PER_PAGE: usize = 3;

const TRACKING_BASE_URL: &str = "https://www.trackingmore.com/track/en/";

/// The subset of a product embedded in an order line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    #[serde(default)]
    pub id: Option<ProductId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// The subset of a shipping address embedded in an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    #[serde(default)]
    pub id: Option<AddressId>,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address_line_1: String,
    #[serde(default)]
    pub address_line_2: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub quantity: u32,
    pub price_each: Decimal,
    pub total_price: Decimal,
    /// Null when the product row has since been deleted.
    #[serde(default)]
    pub product: Option<ProductSnapshot>,
}

impl OrderItem {
    #[must_use]
    pub fn product_name(&self) -> &str {
        self.product
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn image_url(&self) -> &str {
        self.product
            .as_ref()
            .and_then(|p| p.image_url.as_deref())
            .unwrap_or_default()
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
    /// Total in US dollars.
    pub total_amount: Decimal,
    #[serde(default)]
    pub total_amount_in_cny: Option<Decimal>,
    #[serde(default)]
    pub total_amount_in_cad: Option<Decimal>,
    /// USD → CNY rate used when the order was placed.
    #[serde(default)]
    pub rate: Option<Decimal>,
    #[serde(default)]
    pub rate_usd_cad: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_payment_method")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub tracking_no: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<AddressSnapshot>,
}

/// Unknown method strings from older writers become `None`.
fn lenient_payment_method<'de, D>(deserializer: D) -> Result<Option<PaymentMethod>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

impl Order {
    /// Carrier tracking page, once a tracking number is assigned.
    #[must_use]
    pub fn tracking_url(&self) -> Option<String> {
        self.tracking_no
            .as_deref()
            .map(str::trim)
            .filter(|no| !no.is_empty())
            .map(|no| format!("{TRACKING_BASE_URL}{no}"))
    }

    /// Total in US dollars.
    #[must_use]
    pub const fn total_usd(&self) -> Money {
        Money::usd(self.total_amount)
    }

    /// Total in the currency the order settles in, when recorded.
    #[must_use]
    pub fn settlement_total(&self) -> Option<Money> {
        let currency = self
            .payment_method
            .map_or(CurrencyCode::CNY, PaymentMethod::settlement_currency);
        let amount = match currency {
            CurrencyCode::CAD => self.total_amount_in_cad,
            CurrencyCode::CNY => self.total_amount_in_cny,
            CurrencyCode::USD => Some(self.total_amount),
        }?;
        Some(Money::new(amount, currency))
    }

    /// Whether the "继续付款" action applies: a pending order paid through
    /// a provider with a recorded shipping address.
    #[must_use]
    pub fn can_resume_payment(&self) -> bool {
        self.status.can_resume_payment()
            && matches!(
                self.payment_method,
                Some(PaymentMethod::Alipay | PaymentMethod::Wechat)
            )
            && self.shipping_address.as_ref().is_some_and(|a| a.id.is_some())
    }

    /// Creation time for display, e.g. `2025-03-01 14:05`.
    #[must_use]
    pub fn created_label(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// One page of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number, clamped into range.
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
    /// 1-based index of the first item shown, 0 when empty.
    pub start: usize,
    /// 1-based index of the last item shown.
    pub end: usize,
}

impl<T> Page<T> {
    /// Slice `all` into the requested page. Page numbers below 1 or past the
    /// end clamp to the nearest valid page.
    #[must_use]
    pub fn paginate(all: Vec<T>, requested: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let total_items = all.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        let number = requested.clamp(1, total_pages);
        let skip = (number - 1) * per_page;

        let items: Vec<T> = all.into_iter().skip(skip).take(per_page).collect();
        let (start, end) = if items.is_empty() {
            (0, 0)
        } else {
            (skip + 1, skip + items.len())
        };

        Self {
            items,
            number,
            total_pages,
            total_items,
            start,
            end,
        }
    }

    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.number > 1
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    /// Page numbers for the pager.
    pub fn numbers(&self) -> impl Iterator<Item = usize> {
        1..=self.total_pages
    }

    /// `start-end of total`.
    #[must_use]
    pub fn range_label(&self) -> String {
        format!("{}-{} of {}", self.start, self.end, self.total_items)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order_json(status: &str, method: &str, tracking: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "id": OrderId::new_v4(),
            "created_at": "2025-03-01T14:05:09.123456+00:00",
            "status": status,
            "total_amount": 90.5,
            "total_amount_in_cny": 642.55,
            "rate": 7.1,
            "payment_method": method,
            "tracking_no": tracking,
            "shipping_address": {
                "id": AddressId::new_v4(),
                "full_name": "王小明",
                "address_line_1": "1 Main St",
                "phone": "1",
                "province": "Ontario",
                "city": "Toronto",
                "postal_code": "M5X",
                "country": "Canada"
            },
            "order_items": [{
                "id": OrderItemId::new_v4(),
                "quantity": 2,
                "price_each": 45.25,
                "total_price": 90.5,
                "product": { "id": ProductId::new_v4(), "name": "软中华", "image_url": "u" }
            }]
        })
    }

    #[test]
    fn test_deserialize_embedded_order() {
        let order: Order = serde_json::from_value(order_json("pending", "alipay", None)).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_method, Some(PaymentMethod::Alipay));
        assert_eq!(order.order_items.first().unwrap().product_name(), "软中华");
        assert_eq!(order.settlement_total().unwrap().display(), "¥642.55");
        assert_eq!(order.created_label(), "2025-03-01 14:05");
        assert!(order.can_resume_payment());
    }

    #[test]
    fn test_unknown_method_is_tolerated() {
        let order: Order = serde_json::from_value(order_json("paid", "paypal", None)).unwrap();
        assert_eq!(order.payment_method, None);
        assert!(!order.can_resume_payment());
    }

    #[test]
    fn test_resume_only_for_provider_methods() {
        let order: Order =
            serde_json::from_value(order_json("pending", "etransfer", None)).unwrap();
        assert!(!order.can_resume_payment());
        let order: Order = serde_json::from_value(order_json("expired", "wechat", None)).unwrap();
        assert!(!order.can_resume_payment());
    }

    #[test]
    fn test_tracking_url() {
        let order: Order =
            serde_json::from_value(order_json("shipped", "wechat", Some("YT123"))).unwrap();
        assert_eq!(
            order.tracking_url().as_deref(),
            Some("https://www.trackingmore.com/track/en/YT123")
        );
        let order: Order = serde_json::from_value(order_json("shipped", "wechat", Some(" ")))
            .unwrap();
        assert_eq!(order.tracking_url(), None);
    }

    #[test]
    fn test_paginate_three_per_page() {
        let page = Page::paginate((1..=7).collect::<Vec<_>>(), 3, ORDERS_PER_PAGE);
        assert_eq!(page.items, vec![7]);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.range_label(), "7-7 of 7");
        assert!(page.has_previous());
        assert!(!page.has_next());
    }

    #[test]
    fn test_paginate_clamps_out_of_range() {
        let page = Page::paginate((1..=4).collect::<Vec<_>>(), 99, ORDERS_PER_PAGE);
        assert_eq!(page.number, 2);
        let page = Page::paginate((1..=4).collect::<Vec<_>>(), 0, ORDERS_PER_PAGE);
        assert_eq!(page.number, 1);
        assert_eq!(page.range_label(), "1-3 of 4");
    }

    #[test]
    fn test_paginate_empty() {
        let page: Page<u8> = Page::paginate(Vec::new(), 1, ORDERS_PER_PAGE);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.range_label(), "0-0 of 0");
        assert_eq!(page.numbers().count(), 1);
    }
}
