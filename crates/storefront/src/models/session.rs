//! Session-related types.
//!
//! Types stored in the session for authentication state and for parameters
//! handed from one screen to the next.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use guoyan_core::{Email, ExchangeRates, RateError, UserId};

/// Session-stored customer identity.
///
/// Minimal data stored in the session to identify the signed-in customer
/// and to call the backend on their behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentCustomer {
    /// Backend user ID.
    pub id: UserId,
    /// Sign-in e-mail.
    pub email: Email,
    /// Access token for row-level-secured calls.
    pub access_token: String,
    /// When `access_token` stops working.
    pub expires_at: DateTime<Utc>,
}

impl CurrentCustomer {
    /// Whether the access token has expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Transient parameters for the next screen, consumed by the page that
/// reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationParams {
    /// A WeChat Pay QR code to show on the order list.
    #[serde(default)]
    pub wechat_payment: Option<WechatPayment>,
}

/// A WeChat Pay code URL and when it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WechatPayment {
    pub code_url: String,
    pub issued_at: DateTime<Utc>,
}

/// Rates the visitor last saw on the checkout page.
///
/// The order is priced with these, not with whatever the rate source says
/// by the time the button is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedRates {
    pub usd_cny: Decimal,
    pub usd_cad: Decimal,
}

impl QuotedRates {
    /// Back to checked rates.
    ///
    /// # Errors
    ///
    /// Returns [`RateError`] if a stored rate is not positive.
    pub fn rates(self) -> Result<ExchangeRates, RateError> {
        ExchangeRates::new(self.usd_cny, self.usd_cad)
    }
}

impl From<ExchangeRates> for QuotedRates {
    fn from(rates: ExchangeRates) -> Self {
        Self {
            usd_cny: rates.usd_cny.value(),
            usd_cad: rates.usd_cad.value(),
        }
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the signed-in customer.
    pub const CURRENT_CUSTOMER: &str = "current_customer";

    /// Key for the checkout state machine.
    pub const CHECKOUT: &str = "checkout";

    /// Key for [`NavigationParams`](super::NavigationParams).
    pub const NAVIGATION: &str = "navigation";

    /// Key for [`QuotedRates`](super::QuotedRates).
    pub const QUOTED_RATES: &str = "quoted_rates";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let customer = CurrentCustomer {
            id: UserId::new_v4(),
            email: Email::parse("wang@example.com").unwrap(),
            access_token: "t".to_string(),
            expires_at: now,
        };
        assert!(customer.is_expired(now));
        assert!(!customer.is_expired(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_quoted_rates_survive_the_session() {
        let rates = ExchangeRates::new(Decimal::new(725, 2), Decimal::new(137, 2)).unwrap();
        let json = serde_json::to_value(QuotedRates::from(rates)).unwrap();
        let back: QuotedRates = serde_json::from_value(json).unwrap();
        assert_eq!(back.rates().unwrap(), rates);
    }

    #[test]
    fn test_tampered_quote_is_rejected() {
        let quote = QuotedRates {
            usd_cny: Decimal::ZERO,
            usd_cad: Decimal::ONE,
        };
        assert!(quote.rates().is_err());
    }
}
