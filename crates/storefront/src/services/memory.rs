//! In-memory cart and checkout storage.

use std::sync::{Mutex, PoisonError};

use guoyan_core::cart::Cart;
use guoyan_core::checkout::CheckoutMachine;

use super::cart::{CartError, CartStorage};
use super::checkout::{CheckoutError, CheckoutStorage};

/// Cart and checkout state held in process memory, one visitor per value.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    cart: Mutex<Option<Cart>>,
    checkout: Mutex<CheckoutMachine>,
}

impl MemoryStorage {
    /// Storage holding `cart`.
    #[must_use]
    pub fn with_cart(cart: Cart) -> Self {
        Self {
            cart: Mutex::new(Some(cart)),
            checkout: Mutex::default(),
        }
    }

    /// Whether a cart is stored at all (the key is present).
    #[must_use]
    pub fn has_cart(&self) -> bool {
        self.cart
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Snapshot of the checkout machine.
    #[must_use]
    pub fn machine(&self) -> CheckoutMachine {
        self.checkout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CartStorage for MemoryStorage {
    async fn load_cart(&self) -> Result<Cart, CartError> {
        Ok(self
            .cart
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), CartError> {
        *self.cart.lock().unwrap_or_else(PoisonError::into_inner) = Some(cart.clone());
        Ok(())
    }

    async fn clear_cart(&self) -> Result<(), CartError> {
        *self.cart.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

impl CheckoutStorage for MemoryStorage {
    async fn load_machine(&self) -> Result<CheckoutMachine, CheckoutError> {
        Ok(self.machine())
    }

    async fn save_machine(&self, machine: &CheckoutMachine) -> Result<(), CheckoutError> {
        *self.checkout.lock().unwrap_or_else(PoisonError::into_inner) = machine.clone();
        Ok(())
    }
}
