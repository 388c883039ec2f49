//! Client for the hosted backend (auth, tables, payment functions).
//!
//! # Architecture
//!
//! - Plain REST over `reqwest`: the auth API under `/auth/v1`, the table API
//!   under `/rest/v1`, and edge functions under `/functions/v1`
//! - The backend is the source of truth; nothing is synced locally
//! - In-memory caching via `moka` for catalog reads (5 minutes) and for
//!   users and exchange rates (1 hour)
//! - Row-level security does the authorization: every per-user call carries
//!   the customer's access token
//!
//! # Example
//!
//! ```rust,ignore
//! use guoyan_storefront::backend::SupabaseClient;
//!
//! let client = SupabaseClient::new(&config.supabase);
//!
//! let products = client.list_products().await?;
//! let addresses = client.list_addresses(&customer.access_token, customer.id).await?;
//! ```

mod cache;
mod client;
pub mod types;

use std::future::Future;

use guoyan_core::payment::{PaymentRequest, PaymentResponse};
use thiserror::Error;

pub use client::SupabaseClient;
pub use types::{AuthSession, AuthUser, CurrencyRateRow};

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The access token was rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// A success response without the data the caller needs.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Whether the failure means the customer must sign in again.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Invokes payment functions on behalf of a signed-in customer.
///
/// Checkout is written against this trait so the flow can be exercised
/// without a backend.
pub trait PaymentFunctions: Send + Sync {
    /// Invoke the function for `request.method()` with `request` as the body.
    fn invoke_payment(
        &self,
        request: &PaymentRequest,
        access_token: &str,
    ) -> impl Future<Output = Result<PaymentResponse, BackendError>> + Send;
}
