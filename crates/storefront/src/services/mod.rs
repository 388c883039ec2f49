//! Business logic services for storefront.
//!
//! # Services
//!
//! - `cart` - Cart persistence in the session
//! - `checkout` - Order placement against the payment functions
//! - `currency` - Exchange rate lookup with fallback, and the rates quoted
//!   to each visitor
//!
//! Services are written against the [`cart::CartStorage`] and
//! [`checkout::CheckoutStorage`] traits rather than the session directly.
//! [`MemoryStorage`] implements both for tests and tooling.

pub mod cart;
pub mod checkout;
pub mod currency;
mod memory;

pub use cart::{CartError, CartStorage, CartStore};
pub use checkout::{
    CheckoutError, CheckoutOutcome, CheckoutRequest, CheckoutStorage, PaymentError,
    SubmissionLocks, resume_payment, submit_checkout,
};
pub use currency::{current_rates, quote_rates, quoted_rates};
pub use memory::MemoryStorage;
