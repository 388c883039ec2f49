//! Session models for storefront.
//!
//! Products, addresses and orders come from `guoyan_core`; this module only
//! holds what the storefront keeps in the visitor's session.

pub mod session;

pub use session::{CurrentCustomer, NavigationParams, QuotedRates, WechatPayment};
pub use session::keys as session_keys;
