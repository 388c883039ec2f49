//! Contact page with out-of-band payment instructions.

use askama::Template;
use askama_web::WebTemplate;
use guoyan_core::PaymentMethod;
use tower_sessions::Session;

use super::NavContext;
use crate::filters;
use crate::middleware::OptionalAuth;

/// Interac e-Transfer recipient.
pub const ETRANSFER_EMAIL: &str = "pay@guoyango.com";

/// Customer service WeChat ID.
pub const SUPPORT_WECHAT_ID: &str = "guoyango_cs";

/// Customer service e-mail.
pub const SUPPORT_EMAIL: &str = "support@guoyango.com";

/// Contact page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/contact.html")]
pub struct ContactTemplate {
    pub nav: NavContext,
    pub etransfer_label: &'static str,
    pub manual_label: &'static str,
    pub etransfer_email: &'static str,
    pub support_wechat: &'static str,
    pub support_email: &'static str,
}

/// Display the contact page.
pub async fn show(session: Session, OptionalAuth(customer): OptionalAuth) -> ContactTemplate {
    ContactTemplate {
        nav: NavContext::load(&session, customer.as_ref()).await,
        etransfer_label: PaymentMethod::ETransfer.label(),
        manual_label: PaymentMethod::Manual.label(),
        etransfer_email: ETRANSFER_EMAIL,
        support_wechat: SUPPORT_WECHAT_ID,
        support_email: SUPPORT_EMAIL,
    }
}
