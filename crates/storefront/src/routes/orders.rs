//! Order history and payment resumption.
//!
//! A WeChat Pay checkout leaves its code URL in the session
//! ([`NavigationParams`]). While it is there the order list shows the QR
//! modal, which polls `/orders/wechat-pay/countdown` every second. The
//! countdown is measured from when the code was issued, so reloading the
//! page does not restart it.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use guoyan_core::OrderId;
use guoyan_core::checkout::ORDER_FAILED_MESSAGE;
use guoyan_core::order::{ORDERS_PER_PAGE, Order, Page};
use guoyan_core::payment::{PaymentOutcome, PaymentRequestError};
use guoyan_core::payment_qr::{QrCountdown, Tick};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use super::NavContext;
use crate::backend::BackendError;
use crate::error::{AppError, Result};
use crate::filters;
use crate::htmx::{HxRedirect, HxRefresh, Triggers, WECHAT_PAY_CLOSED};
use crate::middleware::RequireAuth;
use crate::models::{NavigationParams, WechatPayment, session_keys};
use crate::services::{PaymentError, resume_payment};
use crate::state::AppState;

// =============================================================================
// View Models
// =============================================================================

/// An order line for display.
pub struct OrderLineView {
    pub name: String,
    pub image_url: String,
    pub quantity: u32,
    pub price_each: String,
    pub total: String,
}

/// An order for display.
pub struct OrderView {
    pub id: String,
    pub created: String,
    pub status_label: &'static str,
    pub badge_class: &'static str,
    pub lines: Vec<OrderLineView>,
    pub total_usd: String,
    pub settlement_total: Option<String>,
    pub payment_label: Option<&'static str>,
    pub tracking_url: Option<String>,
    pub tracking_no: Option<String>,
    pub ship_to: Option<String>,
    pub can_resume: bool,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            created: order.created_label(),
            status_label: order.status.label(),
            badge_class: order.status.badge_class(),
            lines: order
                .order_items
                .iter()
                .map(|item| OrderLineView {
                    name: item.product_name().to_string(),
                    image_url: item.image_url().to_string(),
                    quantity: item.quantity,
                    price_each: guoyan_core::Money::usd(item.price_each).display(),
                    total: guoyan_core::Money::usd(item.total_price).display(),
                })
                .collect(),
            total_usd: order.total_usd().display(),
            settlement_total: order.settlement_total().map(|m| m.display()),
            payment_label: order.payment_method.map(|m| m.label()),
            tracking_url: order.tracking_url(),
            tracking_no: order.tracking_no.clone(),
            ship_to: order
                .shipping_address
                .as_ref()
                .map(|a| format!("{} · {}, {}", a.full_name, a.city, a.country)),
            can_resume: order.can_resume_payment(),
        }
    }
}

/// The QR modal in its current second.
pub struct WechatModal {
    pub code_url: String,
    pub loading: bool,
    pub remaining: String,
}

/// Advance a fresh countdown by the time since the code was issued.
fn countdown_for(payment: &WechatPayment, now: DateTime<Utc>) -> (QrCountdown, Tick) {
    let elapsed = (now - payment.issued_at).num_seconds().max(0);
    let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);

    let mut countdown = QrCountdown::new();
    countdown.open();
    let tick = countdown.advance(elapsed);
    (countdown, tick)
}

fn modal_for(payment: &WechatPayment, now: DateTime<Utc>) -> Option<WechatModal> {
    match countdown_for(payment, now) {
        (countdown, Tick::Running(_)) => Some(WechatModal {
            code_url: payment.code_url.clone(),
            loading: countdown.is_loading(),
            remaining: countdown.display(),
        }),
        (_, Tick::Expired | Tick::Closed) => None,
    }
}

async fn wechat_payment(session: &Session) -> Result<Option<WechatPayment>> {
    let params: Option<NavigationParams> = session.get(session_keys::NAVIGATION).await?;
    Ok(params.and_then(|p| p.wechat_payment))
}

async fn clear_wechat_payment(session: &Session) -> Result<bool> {
    let removed: Option<NavigationParams> = session.remove(session_keys::NAVIGATION).await?;
    Ok(removed.is_some_and(|p| p.wechat_payment.is_some()))
}

// =============================================================================
// Templates
// =============================================================================

/// Order history page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/orders.html")]
pub struct OrdersTemplate {
    pub nav: NavContext,
    pub page: Page<OrderView>,
    pub wechat: Option<WechatModal>,
}

/// QR modal fragment, replaced on every countdown poll.
#[derive(Template, WebTemplate)]
#[template(path = "partials/wechat_modal.html")]
pub struct WechatModalTemplate {
    pub modal: WechatModal,
}

/// Message shown under an order's pay button.
#[derive(Template, WebTemplate)]
#[template(path = "partials/order_status.html")]
pub struct OrderStatusTemplate {
    pub message: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Query parameters for the order list.
#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    #[serde(default = "first_page")]
    pub page: usize,
}

const fn first_page() -> usize {
    1
}

/// Display the order history.
#[instrument(skip(state, session, customer))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Query(query): Query<OrdersQuery>,
) -> Result<OrdersTemplate> {
    let orders = state
        .backend()
        .list_orders(&customer.access_token, customer.id)
        .await?;
    let views: Vec<OrderView> = orders.iter().map(OrderView::from).collect();

    let wechat = match wechat_payment(&session).await? {
        Some(payment) => {
            let modal = modal_for(&payment, Utc::now());
            if modal.is_none() {
                clear_wechat_payment(&session).await?;
            }
            modal
        }
        None => None,
    };

    Ok(OrdersTemplate {
        nav: NavContext::load(&session, Some(&customer)).await,
        page: Page::paginate(views, query.page, ORDERS_PER_PAGE),
        wechat,
    })
}

/// One countdown poll of the QR modal (HTMX).
///
/// Expiry removes the modal and fires `wechat-pay-closed` once; later polls
/// find nothing in the session and answer with an empty body.
#[instrument(skip(session))]
pub async fn countdown(session: Session) -> Result<Response> {
    let Some(payment) = wechat_payment(&session).await? else {
        return Ok(Html("").into_response());
    };

    if let Some(modal) = modal_for(&payment, Utc::now()) {
        return Ok(WechatModalTemplate { modal }.into_response());
    }

    clear_wechat_payment(&session).await?;
    tracing::info!("WeChat Pay QR code expired");
    Ok((
        Triggers::new().event(WECHAT_PAY_CLOSED, json!({ "reason": "expired" })),
        Html(""),
    )
        .into_response())
}

/// Close the QR modal (HTMX).
#[instrument(skip(session))]
pub async fn close_wechat_pay(session: Session) -> Result<Response> {
    if clear_wechat_payment(&session).await? {
        return Ok((
            Triggers::new().event(WECHAT_PAY_CLOSED, json!({ "reason": "closed" })),
            Html(""),
        )
            .into_response());
    }
    Ok(Html("").into_response())
}

/// Send a pending order back to its payment provider (HTMX).
///
/// Alipay navigates to the provider page; WeChat Pay reloads the order list
/// with a fresh QR code.
#[instrument(skip(state, session, customer))]
pub async fn resume(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Path(id): Path<String>,
) -> Result<Response> {
    let id: OrderId = id
        .parse()
        .map_err(|_| AppError::NotFound(format!("order {id}")))?;
    let order = state
        .backend()
        .get_order(&customer.access_token, customer.id, id)
        .await?;

    match resume_payment(state.backend(), &order, &customer.access_token).await {
        Ok(PaymentOutcome::AlipayRedirect { url }) => Ok((HxRedirect(url), ()).into_response()),
        Ok(PaymentOutcome::WechatQr { code_url }) => {
            let params = NavigationParams {
                wechat_payment: Some(WechatPayment {
                    code_url,
                    issued_at: Utc::now(),
                }),
            };
            session.insert(session_keys::NAVIGATION, &params).await?;
            Ok((HxRefresh, ()).into_response())
        }
        Ok(PaymentOutcome::OrderCreated) => Ok((HxRefresh, ()).into_response()),
        Err(PaymentError::Backend(BackendError::Unauthorized)) => Ok((
            HxRedirect(format!(
                "/auth/login?next={}",
                urlencoding::encode("/orders")
            )),
            (),
        )
            .into_response()),
        Err(PaymentError::Request(e)) => {
            tracing::warn!(error = %e, order_id = %order.id, "Order cannot be resumed");
            let message = match e {
                PaymentRequestError::NotResumable(_) => "该订单无法继续付款",
                _ => "订单信息不完整，请联系客服",
            };
            Ok(OrderStatusTemplate {
                message: message.to_string(),
            }
            .into_response())
        }
        Err(e) => {
            tracing::error!(error = %e, order_id = %order.id, "Resuming payment failed");
            Ok(OrderStatusTemplate {
                message: ORDER_FAILED_MESSAGE.to_string(),
            }
            .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn payment(issued_at: DateTime<Utc>) -> WechatPayment {
        WechatPayment {
            code_url: "weixin://wxpay/bizpayurl?pr=abc".to_string(),
            issued_at,
        }
    }

    #[test]
    fn test_modal_loading_in_first_second() {
        let now = Utc::now();
        let modal = modal_for(&payment(now), now).unwrap_or_else(|| panic!("modal"));
        assert!(modal.loading);
        assert_eq!(modal.remaining, "5:00");
    }

    #[test]
    fn test_modal_counts_from_issue_time() {
        let now = Utc::now();
        let modal = modal_for(&payment(now - Duration::seconds(61)), now)
            .unwrap_or_else(|| panic!("modal"));
        assert!(!modal.loading);
        assert_eq!(modal.remaining, "3:59");
    }

    #[test]
    fn test_modal_gone_after_five_minutes() {
        let now = Utc::now();
        assert!(modal_for(&payment(now - Duration::seconds(300)), now).is_none());
    }

    #[test]
    fn test_clock_skew_counts_as_fresh() {
        let now = Utc::now();
        let (countdown, tick) = countdown_for(&payment(now + Duration::seconds(30)), now);
        assert_eq!(tick, Tick::Running(300));
        assert!(countdown.is_loading());
    }
}
