//! Guoyan Go Core - domain types for the storefront.
//!
//! This crate holds everything the storefront knows about products, carts,
//! addresses, orders and payments, without any I/O. The `storefront` crate
//! wires these types to the hosted backend and to HTTP handlers.
//!
//! # Modules
//!
//! - [`types`] - IDs, e-mail, money and status enums
//! - [`catalog`] - products and listing queries
//! - [`cart`] - the cart and its typed actions
//! - [`address`] - shipping addresses and form validation
//! - [`order`] - order history records and pagination
//! - [`payment`] - payment function requests and responses
//! - [`checkout`] - checkout validation and state machine
//! - [`payment_qr`] - WeChat Pay QR countdown

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod address;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod order;
pub mod payment;
pub mod payment_qr;
pub mod types;

pub use types::*;
