//! Session-backed cart persistence.
//!
//! The cart lives in the visitor's session under [`CART_STORAGE_KEY`] as a
//! JSON array of items. [`CartStore`] is the only writer: it loads the cart,
//! applies a [`CartAction`], persists the result and hands back the
//! [`CartEvent`] that routes broadcast to the rest of the page.

use std::future::Future;

use guoyan_core::cart::{CART_STORAGE_KEY, Cart, CartAction, CartEvent, CartItem};
use thiserror::Error;
use tower_sessions::Session;

/// Errors reading or writing the persisted cart.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// Where the cart is persisted.
pub trait CartStorage: Send + Sync {
    /// Load the persisted cart. A missing or unreadable value is an empty cart.
    fn load_cart(&self) -> impl Future<Output = Result<Cart, CartError>> + Send;

    /// Persist `cart` under the cart key.
    fn save_cart(&self, cart: &Cart) -> impl Future<Output = Result<(), CartError>> + Send;

    /// Remove the cart key entirely.
    fn clear_cart(&self) -> impl Future<Output = Result<(), CartError>> + Send;
}

impl CartStorage for Session {
    async fn load_cart(&self) -> Result<Cart, CartError> {
        let Some(value) = self.get_value(CART_STORAGE_KEY).await? else {
            return Ok(Cart::new());
        };

        match serde_json::from_value::<Vec<CartItem>>(value) {
            Ok(items) => Ok(Cart::from_items(items)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable cart");
                Ok(Cart::new())
            }
        }
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), CartError> {
        self.insert(CART_STORAGE_KEY, cart).await?;
        Ok(())
    }

    async fn clear_cart(&self) -> Result<(), CartError> {
        self.remove_value(CART_STORAGE_KEY).await?;
        Ok(())
    }
}

/// Read-modify-write access to a visitor's cart.
pub struct CartStore<'a, S> {
    storage: &'a S,
}

impl<'a, S: CartStorage> CartStore<'a, S> {
    pub const fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// The current cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the storage cannot be read.
    pub async fn load(&self) -> Result<Cart, CartError> {
        self.storage.load_cart().await
    }

    /// Apply `action` and persist the result. An emptied cart removes the
    /// key instead of storing `[]`.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the storage cannot be read or written.
    pub async fn apply(&self, action: CartAction) -> Result<(Cart, CartEvent), CartError> {
        let mut cart = self.storage.load_cart().await?;
        let event = cart.apply(action);

        if cart.is_empty() {
            self.storage.clear_cart().await?;
        } else {
            self.storage.save_cart(&cart).await?;
        }

        tracing::debug!(count = event.count(), "Cart updated");
        Ok((cart, event))
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the storage cannot be written.
    pub async fn clear(&self) -> Result<CartEvent, CartError> {
        self.apply(CartAction::Clear).await.map(|(_, event)| event)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use guoyan_core::ProductId;
    use guoyan_core::catalog::Product;
    use rust_decimal::Decimal;

    use super::*;
    use crate::services::MemoryStorage;

    fn product(price: &str) -> Product {
        Product {
            id: ProductId::new_v4(),
            name: "中华（软）".to_string(),
            image_url: "https://img.example/1.png".to_string(),
            price: Decimal::from_str(price).unwrap(),
            original_price: None,
            rating: None,
            brand: "中华".to_string(),
            in_stock: true,
        }
    }

    #[tokio::test]
    async fn test_event_count_matches_persisted_units() {
        let storage = MemoryStorage::default();
        let store = CartStore::new(&storage);
        let a = product("10");
        let b = product("5");

        let (_, event) = store
            .apply(CartAction::Add {
                product: a.clone(),
                quantity: 2,
            })
            .await
            .unwrap();
        assert_eq!(event.count(), 2);

        let (_, event) = store
            .apply(CartAction::Add {
                product: b.clone(),
                quantity: 1,
            })
            .await
            .unwrap();
        assert_eq!(event.count(), 3);
        assert_eq!(storage.load_cart().await.unwrap().unit_count(), 3);

        let (_, event) = store
            .apply(CartAction::SetQuantity {
                product_id: a.id,
                quantity: -4,
            })
            .await
            .unwrap();
        assert_eq!(event.count(), 1);

        let persisted = storage.load_cart().await.unwrap();
        assert_eq!(persisted.unit_count(), 1);
        assert!(persisted.items().iter().all(|item| item.quantity > 0));
    }

    #[tokio::test]
    async fn test_emptied_cart_removes_key() {
        let storage = MemoryStorage::default();
        let store = CartStore::new(&storage);
        let p = product("3.50");

        store
            .apply(CartAction::Add {
                product: p.clone(),
                quantity: 1,
            })
            .await
            .unwrap();
        assert!(storage.has_cart());

        let (_, event) = store
            .apply(CartAction::Remove { product_id: p.id })
            .await
            .unwrap();
        assert_eq!(event.count(), 0);
        assert!(!storage.has_cart());
    }

    #[tokio::test]
    async fn test_clear_emits_zero() {
        let storage = MemoryStorage::default();
        let store = CartStore::new(&storage);
        store
            .apply(CartAction::Add {
                product: product("1"),
                quantity: 5,
            })
            .await
            .unwrap();

        let event = store.clear().await.unwrap();
        assert_eq!(event.count(), 0);
        assert!(!storage.has_cart());
    }
}
