//! The shopping cart and its typed actions.
//!
//! The cart is owned by the visitor's session, not the backend. Every
//! mutation goes through [`Cart::apply`] with a [`CartAction`] and produces a
//! [`CartEvent`] that the caller broadcasts to whatever else displays cart
//! state (the navigation badge, the checkout summary).
//!
//! Invariant: every item holds between 1 and [`MAX_LINE_QUANTITY`] units.
//! Setting a quantity to zero or less removes the item; anything above the
//! cap is clamped to it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::types::{Money, ProductId};

/// Key under which the serialized cart is persisted.
pub const CART_STORAGE_KEY: &str = "cart";

/// Most units a single line may hold.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// A product in the cart with its quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub product: Product,
    pub quantity: u32,
}

impl CartItem {
    /// `price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

/// A mutation of the cart.
#[derive(Debug, Clone, PartialEq)]
pub enum CartAction {
    /// Add `quantity` units; increments an existing line.
    Add { product: Product, quantity: u32 },
    /// Set the quantity of a line. Zero or negative removes it.
    SetQuantity { product_id: ProductId, quantity: i64 },
    /// Remove a line.
    Remove { product_id: ProductId },
    /// Empty the cart.
    Clear,
}

/// Notification emitted after every cart mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    /// The cart changed; `count` is the new unit count.
    Updated { count: u32 },
}

impl CartEvent {
    /// Unit count carried by the event.
    #[must_use]
    pub const fn count(self) -> u32 {
        match self {
            Self::Updated { count } => count,
        }
    }
}

/// An ordered collection of cart items keyed by product ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Rebuild a cart from persisted items, dropping any line whose
    /// quantity is zero and merging duplicate product lines.
    #[must_use]
    pub fn from_items(items: Vec<CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            if item.quantity > 0 {
                cart.add(item.product, item.quantity);
            }
        }
        cart
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Consume the cart, returning its items.
    #[must_use]
    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0, |count, item| count.saturating_add(item.quantity))
    }

    /// Sum of line totals in US dollars.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Subtotal as displayable money.
    #[must_use]
    pub fn subtotal_money(&self) -> Money {
        Money::usd(self.subtotal())
    }

    /// Look up a line by product.
    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product.id == product_id)
    }

    /// Apply an action and return the resulting notification.
    pub fn apply(&mut self, action: CartAction) -> CartEvent {
        match action {
            CartAction::Add { product, quantity } => self.add(product, quantity.max(1)),
            CartAction::SetQuantity {
                product_id,
                quantity,
            } => self.set_quantity(product_id, quantity),
            CartAction::Remove { product_id } => self.remove(product_id),
            CartAction::Clear => self.items.clear(),
        }
        CartEvent::Updated {
            count: self.unit_count(),
        }
    }

    fn add(&mut self, product: Product, quantity: u32) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.product.id == product.id)
        {
            item.quantity = item.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
        } else {
            self.items.push(CartItem {
                product,
                quantity: quantity.min(MAX_LINE_QUANTITY),
            });
        }
    }

    fn set_quantity(&mut self, product_id: ProductId, quantity: i64) {
        let Ok(quantity) = u32::try_from(quantity) else {
            // Negative removes, huge clamps.
            if quantity < 0 {
                self.remove(product_id);
            } else if let Some(item) = self.items.iter_mut().find(|i| i.product.id == product_id) {
                item.quantity = MAX_LINE_QUANTITY;
            }
            return;
        };

        if quantity == 0 {
            self.remove(product_id);
            return;
        }

        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.product.id == product_id)
        {
            item.quantity = quantity.min(MAX_LINE_QUANTITY);
        }
    }

    fn remove(&mut self, product_id: ProductId) {
        self.items.retain(|item| item.product.id != product_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn product(name: &str, price: &str) -> Product {
        Product {
            id: ProductId::new_v4(),
            name: name.to_string(),
            image_url: String::new(),
            price: Decimal::from_str(price).unwrap(),
            original_price: None,
            rating: None,
            brand: "中华".to_string(),
            in_stock: true,
        }
    }

    #[test]
    fn test_add_increments_existing_line() {
        let mut cart = Cart::new();
        let p = product("软中华", "45.50");
        cart.apply(CartAction::Add {
            product: p.clone(),
            quantity: 1,
        });
        let event = cart.apply(CartAction::Add {
            product: p.clone(),
            quantity: 2,
        });
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.get(p.id).unwrap().quantity, 3);
        assert_eq!(event, CartEvent::Updated { count: 3 });
    }

    #[test]
    fn test_add_zero_quantity_adds_one() {
        let mut cart = Cart::new();
        let event = cart.apply(CartAction::Add {
            product: product("a", "1"),
            quantity: 0,
        });
        assert_eq!(event.count(), 1);
    }

    #[test]
    fn test_set_quantity_to_zero_or_below_removes() {
        let mut cart = Cart::new();
        let a = product("a", "1");
        let b = product("b", "2");
        cart.apply(CartAction::Add {
            product: a.clone(),
            quantity: 2,
        });
        cart.apply(CartAction::Add {
            product: b.clone(),
            quantity: 1,
        });

        let event = cart.apply(CartAction::SetQuantity {
            product_id: a.id,
            quantity: 0,
        });
        assert!(cart.get(a.id).is_none());
        assert_eq!(event.count(), 1);

        let event = cart.apply(CartAction::SetQuantity {
            product_id: b.id,
            quantity: -3,
        });
        assert!(cart.is_empty());
        assert_eq!(event.count(), 0);
    }

    #[test]
    fn test_set_quantity_unknown_product_is_noop() {
        let mut cart = Cart::new();
        cart.apply(CartAction::Add {
            product: product("a", "1"),
            quantity: 2,
        });
        let event = cart.apply(CartAction::SetQuantity {
            product_id: ProductId::new_v4(),
            quantity: 9,
        });
        assert_eq!(event.count(), 2);
    }

    #[test]
    fn test_random_sequences_never_hold_non_positive_quantities() {
        let products: Vec<Product> = (0..4).map(|i| product(&format!("p{i}"), "3")).collect();
        let mut cart = Cart::new();
        // Deterministic pseudo-random walk over add / set / remove.
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let pick = usize::try_from(seed % 4).unwrap();
            let p = products.get(pick).unwrap().clone();
            let amount = i64::try_from(seed % 7).unwrap() - 3;
            let action = match (seed >> 8) % 3 {
                0 => CartAction::Add {
                    product: p,
                    quantity: u32::try_from(amount.max(0)).unwrap(),
                },
                1 => CartAction::SetQuantity {
                    product_id: p.id,
                    quantity: amount,
                },
                _ => CartAction::Remove { product_id: p.id },
            };
            let event = cart.apply(action);
            assert!(cart.items().iter().all(|item| item.quantity > 0));
            assert_eq!(
                event.count(),
                cart.items().iter().map(|i| i.quantity).sum::<u32>()
            );
        }
    }

    #[test]
    fn test_subtotal() {
        let mut cart = Cart::new();
        cart.apply(CartAction::Add {
            product: product("a", "10.005"),
            quantity: 1,
        });
        cart.apply(CartAction::Add {
            product: product("b", "2.50"),
            quantity: 2,
        });
        assert_eq!(cart.subtotal(), Decimal::from_str("15.005").unwrap());
        assert_eq!(cart.subtotal_money().display(), "$15.01");
    }

    #[test]
    fn test_persisted_form_is_flat_array() {
        let mut cart = Cart::new();
        let p = product("a", "1");
        cart.apply(CartAction::Add {
            product: p.clone(),
            quantity: 2,
        });
        let json = serde_json::to_value(&cart).unwrap();
        let first = json.as_array().unwrap().first().unwrap();
        assert_eq!(first["name"], "a");
        assert_eq!(first["quantity"], 2);
        assert_eq!(first["id"], p.id.to_string());

        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }

    #[test]
    fn test_from_items_drops_zero_and_merges_duplicates() {
        let p = product("a", "1");
        let cart = Cart::from_items(vec![
            CartItem {
                product: p.clone(),
                quantity: 1,
            },
            CartItem {
                product: product("zero", "1"),
                quantity: 0,
            },
            CartItem {
                product: p.clone(),
                quantity: 2,
            },
        ]);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.unit_count(), 3);
    }

    #[test]
    fn test_huge_quantities_are_capped() {
        let a = product("a", "1");
        let mut cart = Cart::new();
        cart.apply(CartAction::Add {
            product: a.clone(),
            quantity: 1,
        });
        let event = cart.apply(CartAction::SetQuantity {
            product_id: a.id,
            quantity: 99_999_999_999,
        });
        assert_eq!(event.count(), MAX_LINE_QUANTITY);

        let event = cart.apply(CartAction::Add {
            product: product("b", "1"),
            quantity: 1,
        });
        assert_eq!(event.count(), MAX_LINE_QUANTITY + 1);

        let event = cart.apply(CartAction::Add {
            product: a.clone(),
            quantity: u32::MAX,
        });
        assert_eq!(cart.get(a.id).unwrap().quantity, MAX_LINE_QUANTITY);
        assert_eq!(event.count(), MAX_LINE_QUANTITY + 1);

        cart.apply(CartAction::SetQuantity {
            product_id: a.id,
            quantity: 5_000,
        });
        assert_eq!(cart.get(a.id).unwrap().quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_from_items_caps_persisted_quantities() {
        let cart = Cart::from_items(vec![
            CartItem {
                product: product("a", "1"),
                quantity: u32::MAX,
            },
            CartItem {
                product: product("b", "1"),
                quantity: u32::MAX,
            },
        ]);
        assert_eq!(cart.unit_count(), MAX_LINE_QUANTITY * 2);
    }

    #[test]
    fn test_clear() {
        let mut cart = Cart::new();
        cart.apply(CartAction::Add {
            product: product("a", "1"),
            quantity: 5,
        });
        assert_eq!(cart.apply(CartAction::Clear), CartEvent::Updated { count: 0 });
        assert!(cart.is_empty());
    }
}
