//! Checkout route handlers.
//!
//! The page lists the cart with converted totals, the customer's addresses
//! and one button per payment method. Pressing a button posts to
//! `/checkout/pay`, which answers with a status fragment and, on success,
//! HTMX headers that move the customer on to the order list.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use guoyan_core::address::{ShippingAddress, sort_default_first};
use guoyan_core::cart::Cart;
use guoyan_core::checkout::CheckoutBlock;
use guoyan_core::payment::PaymentOutcome;
use guoyan_core::{AddressId, ExchangeRates, PaymentMethod};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::NavContext;
use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::htmx::{HxRedirect, Triggers};
use crate::middleware::OptionalAuth;
use crate::models::{NavigationParams, WechatPayment, session_keys};
use crate::services::{
    CartStore, CheckoutOutcome, CheckoutRequest, CheckoutStorage, quote_rates, quoted_rates,
    submit_checkout,
};
use crate::state::AppState;

// =============================================================================
// View Models
// =============================================================================

/// A cart line for display.
#[derive(Clone)]
pub struct CartLineView {
    pub product_id: String,
    pub name: String,
    pub brand: String,
    pub image_url: String,
    pub quantity: u32,
    pub price: String,
    pub line_total: String,
}

/// Cart lines with totals in every settlement currency.
#[derive(Clone)]
pub struct CartSummary {
    pub lines: Vec<CartLineView>,
    pub unit_count: u32,
    pub subtotal: String,
    pub total_cny: String,
    pub total_cad: String,
    pub rate_cny: String,
    pub rate_cad: String,
    pub minimum: u32,
    pub below_minimum: bool,
}

impl CartSummary {
    #[must_use]
    pub fn new(cart: &Cart, rates: &ExchangeRates, minimum: u32) -> Self {
        let subtotal = cart.subtotal();
        Self {
            lines: cart
                .items()
                .iter()
                .map(|item| CartLineView {
                    product_id: item.product.id.to_string(),
                    name: item.product.name.clone(),
                    brand: item.product.brand.clone(),
                    image_url: item.product.image_url.clone(),
                    quantity: item.quantity,
                    price: item.product.price_money().display(),
                    line_total: guoyan_core::Money::usd(item.line_total()).display(),
                })
                .collect(),
            unit_count: cart.unit_count(),
            subtotal: cart.subtotal_money().display(),
            total_cny: rates.usd_cny.convert(subtotal).display(),
            total_cad: rates.usd_cad.convert(subtotal).display(),
            rate_cny: rates.usd_cny.value().to_string(),
            rate_cad: rates.usd_cad.value().to_string(),
            minimum,
            below_minimum: cart.unit_count() < minimum,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// An address choice.
pub struct AddressOption {
    pub id: String,
    pub full_name: String,
    pub phone: String,
    pub street: String,
    pub locality: String,
    pub is_default: bool,
    pub checked: bool,
}

impl AddressOption {
    fn new(address: &ShippingAddress, checked: bool) -> Self {
        let street = match &address.address_line_2 {
            Some(line_2) => format!("{} {}", address.address_line_1, line_2),
            None => address.address_line_1.clone(),
        };
        Self {
            id: address.id.to_string(),
            full_name: address.full_name.clone(),
            phone: address.phone.clone(),
            street,
            locality: address.locality_line(),
            is_default: address.is_default,
            checked,
        }
    }
}

/// A payment method button.
pub struct MethodButton {
    pub value: &'static str,
    pub label: &'static str,
    pub currency: &'static str,
    pub loading: bool,
}

// =============================================================================
// Templates
// =============================================================================

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/checkout.html")]
pub struct CheckoutTemplate {
    pub nav: NavContext,
    pub summary: CartSummary,
    pub signed_in: bool,
    pub addresses: Vec<AddressOption>,
    pub methods: Vec<MethodButton>,
    pub busy: bool,
}

/// Cart summary fragment (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_summary.html")]
pub struct CartSummaryTemplate {
    pub summary: CartSummary,
}

/// Result of a payment button press.
#[derive(Template, WebTemplate)]
#[template(path = "partials/checkout_status.html")]
pub struct CheckoutStatusTemplate {
    pub message: String,
    pub error: bool,
    pub sign_in: bool,
    pub add_address: bool,
}

impl CheckoutStatusTemplate {
    fn info(message: &str) -> Self {
        Self {
            message: message.to_string(),
            error: false,
            sign_in: false,
            add_address: false,
        }
    }

    fn error(message: String) -> Self {
        Self {
            message,
            error: true,
            sign_in: false,
            add_address: false,
        }
    }

    fn blocked(block: CheckoutBlock) -> Self {
        Self {
            message: block.to_string(),
            error: true,
            sign_in: block == CheckoutBlock::SignInRequired,
            add_address: block == CheckoutBlock::AddressRequired,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the checkout page.
#[instrument(skip(state, session, customer))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
) -> Result<CheckoutTemplate> {
    let cart = CartStore::new(&session).load().await?;
    let rates = quote_rates(&state, &session).await?;

    let addresses = match &customer {
        Some(customer) => {
            let mut addresses = state
                .backend()
                .list_addresses(&customer.access_token, customer.id)
                .await?;
            sort_default_first(&mut addresses);
            addresses
        }
        None => Vec::new(),
    };
    // Pre-select the default, which sorts first
    let addresses = addresses
        .iter()
        .enumerate()
        .map(|(i, address)| AddressOption::new(address, i == 0 && address.is_default))
        .collect();

    let machine = session.load_machine().await?;
    let loading = machine.loading_method();
    let methods = PaymentMethod::ALL
        .iter()
        .map(|&method| MethodButton {
            value: method.as_str(),
            label: method.label(),
            currency: method.settlement_currency().code(),
            loading: loading == Some(method),
        })
        .collect();

    Ok(CheckoutTemplate {
        nav: NavContext::load(&session, customer.as_ref()).await,
        summary: CartSummary::new(&cart, &rates, state.config().checkout_min_units),
        signed_in: customer.is_some(),
        addresses,
        methods,
        busy: machine.is_busy(),
    })
}

/// Cart summary fragment, re-read whenever the cart changes.
#[instrument(skip(state, session))]
pub async fn summary(
    State(state): State<AppState>,
    session: Session,
) -> Result<CartSummaryTemplate> {
    let cart = CartStore::new(&session).load().await?;
    let rates = quote_rates(&state, &session).await?;
    Ok(CartSummaryTemplate {
        summary: CartSummary::new(&cart, &rates, state.config().checkout_min_units),
    })
}

const SUBMITTING_MESSAGE: &str = "订单正在提交，请稍候…";

/// Payment form data.
#[derive(Debug, Deserialize)]
pub struct PayForm {
    pub method: PaymentMethod,
    #[serde(default)]
    pub address_id: Option<String>,
}

/// Place the order (HTMX).
///
/// The order is priced with the rates the checkout page showed. Only one
/// submission per session runs at a time.
///
/// On success the cart is cleared and the response redirects to `/orders`.
/// Alipay additionally opens the provider page in a new tab; WeChat Pay
/// leaves the QR code for the order list to show.
#[instrument(skip(state, session, customer, form), fields(method = %form.method))]
pub async fn pay(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
    Form(form): Form<PayForm>,
) -> Result<Response> {
    let address = form
        .address_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<AddressId>().ok());

    let _claim = match session.id() {
        Some(id) => match state.submission_locks().try_claim(id).await {
            Some(claim) => Some(claim),
            None => {
                tracing::info!("Checkout already in flight for this session");
                return Ok(CheckoutStatusTemplate::info(SUBMITTING_MESSAGE).into_response());
            }
        },
        // No session yet means no cart; validation blocks it.
        None => None,
    };
    let rates = quoted_rates(&state, &session).await?;

    let request = CheckoutRequest {
        method: form.method,
        access_token: customer.as_ref().map(|c| c.access_token.as_str()),
        address,
        rates,
        minimum_units: state.config().checkout_min_units,
    };

    let outcome = submit_checkout(state.backend(), &session, request).await?;

    let response = match outcome {
        CheckoutOutcome::Placed { outcome, event } => {
            add_breadcrumb("checkout", "Order placed", Some(&[("method", form.method.as_str())]));
            let mut triggers = Triggers::new().cart_updated(event);
            match outcome {
                PaymentOutcome::AlipayRedirect { url } => {
                    triggers = triggers.open_payment(&url);
                }
                PaymentOutcome::WechatQr { code_url } => {
                    let params = NavigationParams {
                        wechat_payment: Some(WechatPayment {
                            code_url,
                            issued_at: Utc::now(),
                        }),
                    };
                    session.insert(session_keys::NAVIGATION, &params).await?;
                }
                PaymentOutcome::OrderCreated => {}
            }
            (
                triggers,
                HxRedirect("/orders".to_string()),
                CheckoutStatusTemplate::info("下单成功，正在跳转…"),
            )
                .into_response()
        }
        CheckoutOutcome::Blocked(block) => CheckoutStatusTemplate::blocked(block).into_response(),
        CheckoutOutcome::Failed { message } => {
            CheckoutStatusTemplate::error(message).into_response()
        }
        CheckoutOutcome::Busy => CheckoutStatusTemplate::info(SUBMITTING_MESSAGE).into_response(),
    };

    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use guoyan_core::ProductId;
    use guoyan_core::cart::CartAction;
    use guoyan_core::catalog::Product;
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_summary_converts_with_half_up_rounding() {
        let mut cart = Cart::new();
        cart.apply(CartAction::Add {
            product: Product {
                id: ProductId::new_v4(),
                name: "玉溪".to_string(),
                image_url: String::new(),
                price: Decimal::from_str("10.005").unwrap(),
                original_price: None,
                rating: None,
                brand: "玉溪".to_string(),
                in_stock: true,
            },
            quantity: 1,
        });

        let summary = CartSummary::new(&cart, &ExchangeRates::default(), 2);
        assert_eq!(summary.total_cny, "¥71.04");
        assert!(summary.below_minimum);
        assert_eq!(summary.unit_count, 1);
    }

    #[test]
    fn test_empty_summary() {
        let summary = CartSummary::new(&Cart::new(), &ExchangeRates::default(), 2);
        assert!(summary.is_empty());
        assert_eq!(summary.total_cny, "¥0.00");
        assert_eq!(summary.total_cad, "C$0.00");
    }
}
