//! Cart store: the optimistic, authoritative-for-display line list of the
//! active cart.
//!
//! The store is synchronous and does no I/O. Every mutation returns a
//! [`QuantityChange`] describing what changed so the session can hand it
//! to the persistence gateway.

use std::collections::{HashMap, HashSet};

use buylist_core::{
    CardIdentity, Cart, CartId, CartItem, CatalogCard, MAX_QUANTITY, apply_quantity_delta,
};
use thiserror::Error;

/// Errors raised by local cart mutations. These never reach the backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A line was edited while no cart is active.
    #[error("No active cart")]
    NoActiveCart,

    /// An absolute quantity outside `0..=99` was requested.
    #[error("Quantity {quantity} exceeds maximum allowed ({max})")]
    QuantityOutOfRange { quantity: u32, max: u32 },
}

/// Result of a local line mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityChange {
    pub cart_id: CartId,
    pub identity: CardIdentity,
    /// Quantity before the mutation.
    pub previous: u32,
    /// Quantity after the mutation; 0 means the line was removed.
    pub quantity: u32,
}

impl QuantityChange {
    /// Whether the mutation changed anything.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.previous == self.quantity
    }
}

/// Line items of the active cart.
///
/// Lookup by composite identity is O(1); iteration follows insertion order.
#[derive(Debug, Default)]
pub struct CartStore {
    active_cart: Option<CartId>,
    items: HashMap<CardIdentity, CartItem>,
    order: Vec<CardIdentity>,
}

impl CartStore {
    /// Create an empty store with no active cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The active cart, if any.
    #[must_use]
    pub const fn active_cart(&self) -> Option<CartId> {
        self.active_cart
    }

    /// Switch the active cart. Lines of the previous cart are dropped.
    ///
    /// Returns `true` if the active cart changed.
    pub fn set_active_cart(&mut self, cart_id: Option<CartId>) -> bool {
        if self.active_cart == cart_id {
            return false;
        }
        self.active_cart = cart_id;
        self.items.clear();
        self.order.clear();
        true
    }

    /// Replace local lines with the persisted cart.
    ///
    /// Lines whose write is still pending keep their local quantity so an
    /// in-flight edit is not reverted by a fetch that predates it. Ignored
    /// unless `cart` is the active cart; returns whether it was applied.
    pub fn reconcile(&mut self, cart: &Cart, pending: &HashSet<CardIdentity>) -> bool {
        if self.active_cart != Some(cart.id) {
            return false;
        }

        let mut items = HashMap::new();
        let mut order = Vec::new();

        for item in cart.merged_items() {
            if pending.contains(&item.identity) {
                continue;
            }
            order.push(item.identity.clone());
            items.insert(item.identity.clone(), item);
        }

        for identity in &self.order {
            if !pending.contains(identity) {
                continue;
            }
            if let Some(local) = self.items.get(identity) {
                order.push(identity.clone());
                items.insert(identity.clone(), local.clone());
            }
        }

        self.items = items;
        self.order = order;
        true
    }

    /// Apply a signed delta to a line, clamped to `0..=99`.
    ///
    /// A line that reaches 0 is removed. A line that does not exist yet is
    /// created without catalog references.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NoActiveCart` if no cart is active.
    pub fn upsert_item(
        &mut self,
        identity: &CardIdentity,
        delta: i32,
    ) -> Result<QuantityChange, StoreError> {
        let previous = self.get_quantity(identity);
        let quantity = apply_quantity_delta(previous, delta);
        self.write(identity, quantity, None)
    }

    /// [`upsert_item`](Self::upsert_item) for a card picked from the
    /// catalog, recording its references on a new line.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NoActiveCart` if no cart is active.
    pub fn upsert_card(
        &mut self,
        card: &CatalogCard,
        delta: i32,
    ) -> Result<QuantityChange, StoreError> {
        let previous = self.get_quantity(&card.identity);
        let quantity = apply_quantity_delta(previous, delta);
        self.write(&card.identity, quantity, Some(card))
    }

    /// Set an absolute quantity.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::QuantityOutOfRange` above 99 (nothing changes),
    /// or `StoreError::NoActiveCart` if no cart is active.
    pub fn set_quantity(
        &mut self,
        identity: &CardIdentity,
        quantity: u32,
    ) -> Result<QuantityChange, StoreError> {
        if quantity > MAX_QUANTITY {
            return Err(StoreError::QuantityOutOfRange {
                quantity,
                max: MAX_QUANTITY,
            });
        }
        self.write(identity, quantity, None)
    }

    fn write(
        &mut self,
        identity: &CardIdentity,
        quantity: u32,
        card: Option<&CatalogCard>,
    ) -> Result<QuantityChange, StoreError> {
        let cart_id = self.active_cart.ok_or(StoreError::NoActiveCart)?;
        let previous = self.get_quantity(identity);

        if quantity == 0 {
            if self.items.remove(identity).is_some() {
                self.order.retain(|id| id != identity);
            }
        } else if let Some(item) = self.items.get_mut(identity) {
            item.quantity = quantity;
        } else {
            let mut item = CartItem::new(identity.clone(), quantity);
            if let Some(card) = card {
                item.base_card_id.clone_from(&card.base_card_id);
                item.image.clone_from(&card.image);
            }
            self.order.push(identity.clone());
            self.items.insert(identity.clone(), item);
        }

        Ok(QuantityChange {
            cart_id,
            identity: identity.clone(),
            previous,
            quantity,
        })
    }

    /// Local quantity of a line; 0 if absent.
    #[must_use]
    pub fn get_quantity(&self, identity: &CardIdentity) -> u32 {
        self.items.get(identity).map_or(0, |item| item.quantity)
    }

    /// Snapshot of the lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.order
            .iter()
            .filter_map(|id| self.items.get(id))
            .cloned()
            .collect()
    }

    /// Whether any line has a positive quantity.
    #[must_use]
    pub fn has_items(&self) -> bool {
        self.items.values().any(|item| item.quantity > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use buylist_core::CartName;

    use super::*;

    fn card(name: &str) -> CardIdentity {
        CardIdentity::new("MTG", name, "Alpha", "Common", "Near Mint", false)
    }

    fn store_with_cart() -> CartStore {
        let mut store = CartStore::new();
        store.set_active_cart(Some(CartId::new(1)));
        store
    }

    #[test]
    fn test_upsert_requires_active_cart() {
        let mut store = CartStore::new();
        assert_eq!(
            store.upsert_item(&card("Forest"), 1),
            Err(StoreError::NoActiveCart)
        );
    }

    #[test]
    fn test_upsert_sums_and_clamps() {
        let mut store = store_with_cart();
        let forest = card("Forest");

        let deltas = [5, 40, -3, 70, -200, 12, 150, -1];
        let mut expected: i64 = 0;
        for delta in deltas {
            let change = store.upsert_item(&forest, delta).unwrap();
            expected = (expected + i64::from(delta)).clamp(0, 99);
            assert_eq!(i64::from(change.quantity), expected);
            assert!(change.quantity <= MAX_QUANTITY);
        }
        assert_eq!(store.get_quantity(&forest), 98);
    }

    #[test]
    fn test_upsert_above_max_clamps_to_max() {
        let mut store = store_with_cart();
        let forest = card("Forest");
        store.upsert_item(&forest, 95).unwrap();

        let change = store.upsert_item(&forest, 10).unwrap();
        assert_eq!(change.previous, 95);
        assert_eq!(change.quantity, 99);
    }

    #[test]
    fn test_identical_identities_merge() {
        let mut store = store_with_cart();
        store.upsert_item(&card("Forest"), 2).unwrap();
        store.upsert_item(&card("Forest"), 3).unwrap();
        store.upsert_item(&card("Island"), 1).unwrap();

        let items = store.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].identity, card("Forest"));
        assert_eq!(items[0].quantity, 5);
    }

    #[test]
    fn test_zero_quantity_removes_line() {
        let mut store = store_with_cart();
        let forest = card("Forest");
        store.upsert_item(&forest, 2).unwrap();

        let change = store.upsert_item(&forest, -2).unwrap();
        assert_eq!(change.quantity, 0);
        assert!(store.items().is_empty());
        assert!(!store.has_items());
        assert_eq!(store.get_quantity(&forest), 0);
    }

    #[test]
    fn test_set_quantity_validates_range() {
        let mut store = store_with_cart();
        let forest = card("Forest");
        assert_eq!(
            store.set_quantity(&forest, 100),
            Err(StoreError::QuantityOutOfRange {
                quantity: 100,
                max: 99
            })
        );
        assert_eq!(store.get_quantity(&forest), 0);

        let change = store.set_quantity(&forest, 99).unwrap();
        assert_eq!(change.quantity, 99);
    }

    #[test]
    fn test_upsert_card_records_catalog_refs() {
        let mut store = store_with_cart();
        let catalog = CatalogCard {
            identity: card("Forest"),
            base_card_id: Some("base-1".to_string()),
            image: Some("https://img.example/forest.jpg".to_string()),
        };
        store.upsert_card(&catalog, 1).unwrap();

        let item = &store.items()[0];
        assert_eq!(item.base_card_id.as_deref(), Some("base-1"));
        assert!(item.image.is_some());
    }

    #[test]
    fn test_switching_cart_drops_lines() {
        let mut store = store_with_cart();
        store.upsert_item(&card("Forest"), 2).unwrap();

        assert!(store.set_active_cart(Some(CartId::new(2))));
        assert!(store.items().is_empty());
        assert!(!store.set_active_cart(Some(CartId::new(2))));
    }

    #[test]
    fn test_reconcile_keeps_pending_lines() {
        let mut store = store_with_cart();
        store.upsert_item(&card("Forest"), 7).unwrap();
        store.upsert_item(&card("Swamp"), 1).unwrap();

        let persisted = Cart {
            id: CartId::new(1),
            name: CartName::parse("Binder").unwrap(),
            items: vec![
                CartItem::new(card("Forest"), 2),
                CartItem::new(card("Island"), 4),
            ],
        };
        let pending = HashSet::from([card("Forest")]);

        assert!(store.reconcile(&persisted, &pending));
        assert_eq!(store.get_quantity(&card("Forest")), 7);
        assert_eq!(store.get_quantity(&card("Island")), 4);
        // Swamp was not pending and the backend does not have it
        assert_eq!(store.get_quantity(&card("Swamp")), 0);
    }

    #[test]
    fn test_reconcile_ignores_other_cart() {
        let mut store = store_with_cart();
        let other = Cart {
            id: CartId::new(9),
            name: CartName::parse("Other").unwrap(),
            items: vec![CartItem::new(card("Forest"), 2)],
        };
        assert!(!store.reconcile(&other, &HashSet::new()));
        assert!(store.items().is_empty());
    }
}
