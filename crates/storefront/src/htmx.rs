//! HTMX response headers.
//!
//! Fragments talk to the rest of the page through `HX-Trigger` events:
//! `cart-updated` re-renders the navigation badge and the checkout summary,
//! `open-payment` opens the Alipay page in a new tab, and
//! `wechat-pay-closed` fires once when the QR modal goes away.

use std::convert::Infallible;

use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};
use guoyan_core::cart::CartEvent;
use serde_json::{Map, Value, json};

pub const HX_REQUEST: &str = "hx-request";
pub const HX_TRIGGER: &str = "hx-trigger";
pub const HX_REDIRECT: &str = "hx-redirect";
pub const HX_REFRESH: &str = "hx-refresh";

pub const CART_UPDATED: &str = "cart-updated";
pub const OPEN_PAYMENT: &str = "open-payment";
pub const WECHAT_PAY_CLOSED: &str = "wechat-pay-closed";

/// Whether the request was issued by HTMX.
#[must_use]
pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key(HX_REQUEST)
}

/// Events for the `HX-Trigger` header, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct Triggers(Map<String, Value>);

impl Triggers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event with a detail payload.
    #[must_use]
    pub fn event(mut self, name: &str, detail: Value) -> Self {
        self.0.insert(name.to_string(), detail);
        self
    }

    /// Broadcast a cart change.
    #[must_use]
    pub fn cart_updated(self, event: CartEvent) -> Self {
        self.event(CART_UPDATED, json!({ "count": event.count() }))
    }

    /// Ask the page to open `url` in a new browsing context.
    #[must_use]
    pub fn open_payment(self, url: &str) -> Self {
        self.event(OPEN_PAYMENT, json!({ "url": url }))
    }

    /// Header value, or `None` when there are no events.
    #[must_use]
    pub fn header_value(&self) -> Option<HeaderValue> {
        if self.0.is_empty() {
            return None;
        }
        HeaderValue::from_str(&Value::Object(self.0.clone()).to_string()).ok()
    }
}

impl IntoResponseParts for Triggers {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if let Some(value) = self.header_value() {
            res.headers_mut().insert(HX_TRIGGER, value);
        } else if !self.0.is_empty() {
            tracing::warn!("Dropping HX-Trigger header with non-ASCII payload");
        }
        Ok(res)
    }
}

/// Full-page navigation for an HTMX request.
#[derive(Debug, Clone)]
pub struct HxRedirect(pub String);

impl IntoResponseParts for HxRedirect {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            res.headers_mut().insert(HX_REDIRECT, value);
        }
        Ok(res)
    }
}

/// Reload the current page.
#[derive(Debug, Clone, Copy)]
pub struct HxRefresh;

impl IntoResponseParts for HxRefresh {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.headers_mut()
            .insert(HX_REFRESH, HeaderValue::from_static("true"));
        Ok(res)
    }
}

/// Accept only same-site relative paths as a post-sign-in destination.
#[must_use]
pub fn safe_next(next: Option<&str>) -> String {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
        .unwrap_or("/")
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_updated_payload() {
        let value = Triggers::new()
            .cart_updated(CartEvent::Updated { count: 4 })
            .header_value()
            .unwrap();
        let parsed: Value = serde_json::from_str(value.to_str().unwrap()).unwrap();
        assert_eq!(parsed, json!({ "cart-updated": { "count": 4 } }));
    }

    #[test]
    fn test_empty_triggers_have_no_header() {
        assert!(Triggers::new().header_value().is_none());
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/checkout")), "/checkout");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(None), "/");
    }
}
