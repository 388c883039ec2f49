//! Wire types for the hosted backend's auth and table APIs.

use chrono::{DateTime, Utc};
use guoyan_core::{Email, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The authenticated user as returned by `GET /auth/v1/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

/// Session issued by `POST /auth/v1/verify`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: i64,
    /// Absolute expiry as a Unix timestamp, when the server sends one.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    /// When the access token stops working.
    #[must_use]
    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| now + chrono::Duration::seconds(self.expires_in))
    }
}

/// Body of `POST /auth/v1/otp`.
#[derive(Debug, Serialize)]
pub(super) struct OtpRequest<'a> {
    pub email: &'a str,
    pub create_user: bool,
}

/// Body of `POST /auth/v1/verify`.
#[derive(Debug, Serialize)]
pub(super) struct VerifyRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub email: &'a str,
    pub token: &'a str,
}

/// Error body returned by the auth and table APIs. Field names differ
/// between services, so every one is optional.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message
            .or(self.msg)
            .or(self.error_description)
            .or(self.error)
    }
}

/// A row of the `currency_rate` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CurrencyRateRow {
    pub usd_cny: Decimal,
    pub usd_cad: Decimal,
}

/// Response of a live USD rate API (`{"rates": {"CNY": 7.1, "CAD": 1.38}}`).
#[derive(Debug, Clone, Deserialize)]
pub struct LiveRatesResponse {
    pub rates: LiveRates,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub struct LiveRates {
    #[serde(rename = "CNY")]
    pub cny: Decimal,
    #[serde(rename = "CAD")]
    pub cad: Decimal,
}

/// Insert body for `shipping_addresses`, owned by `user_id`.
#[derive(Debug, Serialize)]
pub(super) struct OwnedAddress<'a, T: Serialize> {
    #[serde(flatten)]
    pub address: &'a T,
    pub user_id: UserId,
}

/// Parse an e-mail the backend returned, ignoring malformed values.
#[must_use]
pub fn parse_email(raw: Option<&str>) -> Option<Email> {
    raw.and_then(|s| Email::parse(s).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry_prefers_absolute_timestamp() {
        let json = serde_json::json!({
            "access_token": "t",
            "expires_in": 3600,
            "expires_at": 1_700_000_000,
            "user": { "id": UserId::new_v4(), "email": "a@b.co" }
        });
        let session: AuthSession = serde_json::from_value(json).unwrap();
        let expiry = session.expiry(Utc::now());
        assert_eq!(expiry.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_session_expiry_falls_back_to_lifetime() {
        let json = serde_json::json!({
            "access_token": "t",
            "expires_in": 60,
            "user": { "id": UserId::new_v4() }
        });
        let session: AuthSession = serde_json::from_value(json).unwrap();
        let now = Utc::now();
        assert_eq!(session.expiry(now), now + chrono::Duration::seconds(60));
    }

    #[test]
    fn test_error_body_message_precedence() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"msg":"Token has expired or is invalid","error":"x"}"#).unwrap();
        assert_eq!(
            body.into_message().as_deref(),
            Some("Token has expired or is invalid")
        );
    }
}
