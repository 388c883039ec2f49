//! Payment function requests and responses.
//!
//! Orders are placed by invoking one of three backend functions. Alipay and
//! WeChat Pay create (or reuse) an order and return something to hand to the
//! provider; `generate_order` records an order that is settled out of band.
//!
//! Amounts are sent as JSON numbers. Converted totals are computed here, once,
//! with the same rounding the checkout page displays.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::Cart;
use crate::order::Order;
use crate::types::{AddressId, ExchangeRates, OrderId, OrderStatus, PaymentMethod, ProductId};

/// Backend functions that accept a [`PaymentRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentFunction {
    AlipayQr,
    WechatPayQr,
    GenerateOrder,
}

impl PaymentFunction {
    /// The function invoked for a payment method.
    #[must_use]
    pub const fn for_method(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Alipay => Self::AlipayQr,
            PaymentMethod::Wechat => Self::WechatPayQr,
            PaymentMethod::ETransfer | PaymentMethod::Manual => Self::GenerateOrder,
        }
    }

    /// Deployed function name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AlipayQr => "alipay-qr",
            Self::WechatPayQr => "wechatpay-qr",
            Self::GenerateOrder => "generate_order",
        }
    }
}

impl std::fmt::Display for PaymentFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A product and quantity in a payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Reasons a payment request cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentRequestError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("order is {0} and cannot be paid")]
    NotResumable(OrderStatus),
    #[error("orders paid by {0} are settled out of band")]
    OutOfBand(PaymentMethod),
    #[error("order has no payment method")]
    MissingPaymentMethod,
    #[error("order has no shipping address")]
    MissingShippingAddress,
    #[error("order has no recorded exchange rate")]
    MissingRate,
    #[error("order line {0} no longer references a product")]
    MissingProduct(usize),
}

/// The body sent to a payment function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<OrderId>,
    shipping_address_id: AddressId,
    items: Vec<PaymentLine>,
    #[serde(with = "rust_decimal::serde::float")]
    total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    rate: Decimal,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    rate_usd_cad: Option<Decimal>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    total_amount_in_cny: Option<Decimal>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    total_amount_in_cad: Option<Decimal>,
    /// Only sent to `generate_order`.
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_method: Option<PaymentMethod>,
    #[serde(skip)]
    method: PaymentMethod,
}

impl PaymentRequest {
    /// Build a request for a new order from the cart.
    ///
    /// Alipay and WeChat carry the CNY total. Out-of-band methods carry both
    /// rates, the total in their settlement currency, and the method itself.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentRequestError::EmptyCart`] if there is nothing to buy.
    pub fn for_cart(
        method: PaymentMethod,
        shipping_address_id: AddressId,
        cart: &Cart,
        rates: &ExchangeRates,
    ) -> Result<Self, PaymentRequestError> {
        if cart.is_empty() {
            return Err(PaymentRequestError::EmptyCart);
        }

        let items = cart
            .items()
            .iter()
            .map(|item| PaymentLine {
                product_id: item.product.id,
                quantity: item.quantity,
            })
            .collect();
        let subtotal = cart.subtotal();
        let cny = rates.usd_cny.convert(subtotal).amount;
        let cad = rates.usd_cad.convert(subtotal).amount;

        let mut request = Self {
            order_id: None,
            shipping_address_id,
            items,
            total_amount: subtotal,
            rate: rates.usd_cny.value(),
            rate_usd_cad: None,
            total_amount_in_cny: Some(cny),
            total_amount_in_cad: None,
            payment_method: None,
            method,
        };

        match method {
            PaymentMethod::Alipay | PaymentMethod::Wechat => {}
            PaymentMethod::Manual => {
                request.rate_usd_cad = Some(rates.usd_cad.value());
                request.payment_method = Some(method);
            }
            PaymentMethod::ETransfer => {
                request.rate_usd_cad = Some(rates.usd_cad.value());
                request.total_amount_in_cny = None;
                request.total_amount_in_cad = Some(cad);
                request.payment_method = Some(method);
            }
        }

        Ok(request)
    }

    /// Build a request that re-submits a stored pending order to its
    /// provider. Everything comes from the order as stored; the live cart
    /// plays no part.
    ///
    /// # Errors
    ///
    /// Returns a [`PaymentRequestError`] if the order is not pending, was
    /// placed with an out-of-band method, or is missing data the provider
    /// needs.
    pub fn for_order(order: &Order) -> Result<Self, PaymentRequestError> {
        if !order.status.can_resume_payment() {
            return Err(PaymentRequestError::NotResumable(order.status));
        }
        let method = order
            .payment_method
            .ok_or(PaymentRequestError::MissingPaymentMethod)?;
        if method.is_out_of_band() {
            return Err(PaymentRequestError::OutOfBand(method));
        }
        let shipping_address_id = order
            .shipping_address
            .as_ref()
            .and_then(|address| address.id)
            .ok_or(PaymentRequestError::MissingShippingAddress)?;
        let rate = order.rate.ok_or(PaymentRequestError::MissingRate)?;

        let items = order
            .order_items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let product_id = item
                    .product
                    .as_ref()
                    .and_then(|p| p.id)
                    .ok_or(PaymentRequestError::MissingProduct(index))?;
                Ok(PaymentLine {
                    product_id,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            order_id: Some(order.id),
            shipping_address_id,
            items,
            total_amount: order.total_amount,
            rate,
            rate_usd_cad: None,
            total_amount_in_cny: order.total_amount_in_cny,
            total_amount_in_cad: None,
            payment_method: None,
            method,
        })
    }

    #[must_use]
    pub const fn method(&self) -> PaymentMethod {
        self.method
    }

    /// The backend function this request is for.
    #[must_use]
    pub const fn function(&self) -> PaymentFunction {
        PaymentFunction::for_method(self.method)
    }

    #[must_use]
    pub const fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    #[must_use]
    pub fn items(&self) -> &[PaymentLine] {
        &self.items
    }

    #[must_use]
    pub const fn total_amount_in_cny(&self) -> Option<Decimal> {
        self.total_amount_in_cny
    }

    #[must_use]
    pub const fn total_amount_in_cad(&self) -> Option<Decimal> {
        self.total_amount_in_cad
    }
}

/// Raw payment function response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub code_url: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// A successful response missing what the method needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{method} response has no {field}")]
pub struct InvalidPaymentResponse {
    pub method: PaymentMethod,
    pub field: &'static str,
}

/// What the customer does next after a payment function succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Open the Alipay checkout page.
    AlipayRedirect { url: String },
    /// Show the WeChat Pay QR code for this payment URL.
    WechatQr { code_url: String },
    /// Order recorded; payment instructions are on the order list.
    OrderCreated,
}

impl PaymentResponse {
    /// Interpret the response for the method that was requested.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPaymentResponse`] when the provider URL is missing or
    /// blank.
    pub fn into_outcome(self, method: PaymentMethod) -> Result<PaymentOutcome, InvalidPaymentResponse> {
        let non_blank = |value: Option<String>| value.filter(|s| !s.trim().is_empty());
        match method {
            PaymentMethod::Alipay => non_blank(self.url)
                .map(|url| PaymentOutcome::AlipayRedirect { url })
                .ok_or(InvalidPaymentResponse { method, field: "url" }),
            PaymentMethod::Wechat => non_blank(self.code_url)
                .map(|code_url| PaymentOutcome::WechatQr { code_url })
                .ok_or(InvalidPaymentResponse {
                    method,
                    field: "code_url",
                }),
            PaymentMethod::ETransfer | PaymentMethod::Manual => Ok(PaymentOutcome::OrderCreated),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::cart::CartAction;
    use crate::catalog::Product;

    fn cart_with(price: &str, quantity: u32) -> Cart {
        let mut cart = Cart::new();
        cart.apply(CartAction::Add {
            product: Product {
                id: ProductId::new_v4(),
                name: "软中华".to_string(),
                image_url: String::new(),
                price: Decimal::from_str(price).unwrap(),
                original_price: None,
                rating: None,
                brand: "中华".to_string(),
                in_stock: true,
            },
            quantity,
        });
        cart
    }

    fn pending_order(method: &str) -> Order {
        serde_json::from_value(serde_json::json!({
            "id": OrderId::new_v4(),
            "created_at": "2025-03-01T14:05:09Z",
            "status": "pending",
            "total_amount": 20.01,
            "total_amount_in_cny": 142.07,
            "rate": 7.1,
            "payment_method": method,
            "shipping_address": { "id": AddressId::new_v4() },
            "order_items": [{
                "id": crate::types::OrderItemId::new_v4(),
                "quantity": 3,
                "price_each": 6.67,
                "total_price": 20.01,
                "product": { "id": ProductId::new_v4() }
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_alipay_body_from_cart() {
        let cart = cart_with("10.005", 1);
        let address = AddressId::new_v4();
        let request =
            PaymentRequest::for_cart(PaymentMethod::Alipay, address, &cart, &ExchangeRates::default())
                .unwrap();
        assert_eq!(request.function().name(), "alipay-qr");

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["shipping_address_id"], address.to_string());
        assert_eq!(body["total_amount_in_cny"], serde_json::json!(71.04));
        assert_eq!(body["rate"], serde_json::json!(7.1));
        assert_eq!(body["items"][0]["quantity"], 1);
        assert!(body.get("payment_method").is_none());
        assert!(body.get("order_id").is_none());
        assert!(body.get("total_amount_in_cad").is_none());
    }

    #[test]
    fn test_etransfer_body_settles_in_cad() {
        let cart = cart_with("19.99", 1);
        let request = PaymentRequest::for_cart(
            PaymentMethod::ETransfer,
            AddressId::new_v4(),
            &cart,
            &ExchangeRates::default(),
        )
        .unwrap();
        assert_eq!(request.function(), PaymentFunction::GenerateOrder);

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["payment_method"], "etransfer");
        assert_eq!(body["total_amount_in_cad"], serde_json::json!(27.59));
        assert_eq!(body["rate_usd_cad"], serde_json::json!(1.38));
        assert!(body.get("total_amount_in_cny").is_none());
    }

    #[test]
    fn test_manual_body_settles_in_cny_with_both_rates() {
        let cart = cart_with("1", 2);
        let request = PaymentRequest::for_cart(
            PaymentMethod::Manual,
            AddressId::new_v4(),
            &cart,
            &ExchangeRates::default(),
        )
        .unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["payment_method"], "manually");
        assert_eq!(body["total_amount_in_cny"], serde_json::json!(14.2));
        assert_eq!(body["rate_usd_cad"], serde_json::json!(1.38));
    }

    #[test]
    fn test_empty_cart_is_rejected() {
        let err = PaymentRequest::for_cart(
            PaymentMethod::Wechat,
            AddressId::new_v4(),
            &Cart::new(),
            &ExchangeRates::default(),
        )
        .unwrap_err();
        assert_eq!(err, PaymentRequestError::EmptyCart);
    }

    #[test]
    fn test_resume_uses_stored_order() {
        let order = pending_order("wechat");
        let request = PaymentRequest::for_order(&order).unwrap();
        assert_eq!(request.order_id(), Some(order.id));
        assert_eq!(request.function(), PaymentFunction::WechatPayQr);
        assert_eq!(request.items().first().unwrap().quantity, 3);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["total_amount_in_cny"], serde_json::json!(142.07));
    }

    #[test]
    fn test_resume_rejects_paid_and_out_of_band() {
        let mut order = pending_order("alipay");
        order.status = OrderStatus::Paid;
        assert_eq!(
            PaymentRequest::for_order(&order),
            Err(PaymentRequestError::NotResumable(OrderStatus::Paid))
        );
        let order = pending_order("manually");
        assert_eq!(
            PaymentRequest::for_order(&order),
            Err(PaymentRequestError::OutOfBand(PaymentMethod::Manual))
        );
    }

    #[test]
    fn test_resume_requires_rate() {
        let mut order = pending_order("alipay");
        order.rate = None;
        assert_eq!(
            PaymentRequest::for_order(&order),
            Err(PaymentRequestError::MissingRate)
        );
    }

    #[test]
    fn test_response_outcomes() {
        let response = PaymentResponse {
            url: Some("https://openapi.alipay.com/gateway.do?x=1".to_string()),
            ..PaymentResponse::default()
        };
        assert!(matches!(
            response.into_outcome(PaymentMethod::Alipay),
            Ok(PaymentOutcome::AlipayRedirect { .. })
        ));

        let response = PaymentResponse {
            code_url: Some(" ".to_string()),
            ..PaymentResponse::default()
        };
        assert_eq!(
            response.into_outcome(PaymentMethod::Wechat),
            Err(InvalidPaymentResponse {
                method: PaymentMethod::Wechat,
                field: "code_url"
            })
        );

        assert_eq!(
            PaymentResponse::default().into_outcome(PaymentMethod::ETransfer),
            Ok(PaymentOutcome::OrderCreated)
        );
    }
}
