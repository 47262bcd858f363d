//! Card identity, cart line-items and carts.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::cart_name::CartName;
use super::id::CartId;

/// Largest quantity a single cart line may hold.
pub const MAX_QUANTITY: u32 = 99;

/// Apply a signed delta to a quantity, clamping the result to
/// `0..=MAX_QUANTITY`.
///
/// ```
/// use buylist_core::apply_quantity_delta;
///
/// assert_eq!(apply_quantity_delta(2, 3), 5);
/// assert_eq!(apply_quantity_delta(98, 5), 99);
/// assert_eq!(apply_quantity_delta(1, -4), 0);
/// ```
#[must_use]
pub fn apply_quantity_delta(current: u32, delta: i32) -> u32 {
    let next = i64::from(current) + i64::from(delta);
    let clamped = next.clamp(0, i64::from(MAX_QUANTITY));
    // clamped is within 0..=99
    u32::try_from(clamped).unwrap_or(0)
}

/// Composite identity of a card printing in a cart.
///
/// Two lines with equal identities are the same line: quantities merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardIdentity {
    pub card_name: String,
    pub set_name: String,
    pub game: String,
    pub rarity: String,
    pub condition_name: String,
    pub foil: bool,
}

impl CardIdentity {
    /// Create a new card identity.
    #[must_use]
    pub fn new(
        game: impl Into<String>,
        card_name: impl Into<String>,
        set_name: impl Into<String>,
        rarity: impl Into<String>,
        condition_name: impl Into<String>,
        foil: bool,
    ) -> Self {
        Self {
            card_name: card_name.into(),
            set_name: set_name.into(),
            game: game.into(),
            rarity: rarity.into(),
            condition_name: condition_name.into(),
            foil,
        }
    }
}

impl fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} ({}, {}",
            self.card_name, self.game, self.set_name, self.rarity, self.condition_name
        )?;
        if self.foil {
            f.write_str(", foil")?;
        }
        f.write_str(")")
    }
}

/// A card as picked from the catalog: its identity plus catalog references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCard {
    #[serde(flatten)]
    pub identity: CardIdentity,
    pub base_card_id: Option<String>,
    pub image: Option<String>,
}

/// A quantity of one card printing/condition/foil combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub identity: CardIdentity,
    #[serde(default)]
    pub base_card_id: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub quantity: u32,
}

impl CartItem {
    /// Create a line with no catalog references.
    #[must_use]
    pub const fn new(identity: CardIdentity, quantity: u32) -> Self {
        Self {
            identity,
            base_card_id: None,
            image: None,
            quantity,
        }
    }
}

/// A persisted cart as returned by the cart backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub name: CartName,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Lines with a positive quantity, with duplicates merged in first-seen
    /// order.
    ///
    /// The backend should never return duplicates, but the merge rule holds
    /// regardless of where the lines come from.
    #[must_use]
    pub fn merged_items(&self) -> Vec<CartItem> {
        let mut merged: Vec<CartItem> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if let Some(existing) = merged.iter_mut().find(|m| m.identity == item.identity) {
                existing.quantity = existing
                    .quantity
                    .saturating_add(item.quantity)
                    .min(MAX_QUANTITY);
                if existing.base_card_id.is_none() {
                    existing.base_card_id.clone_from(&item.base_card_id);
                }
                if existing.image.is_none() {
                    existing.image.clone_from(&item.image);
                }
            } else {
                let mut item = item.clone();
                item.quantity = item.quantity.min(MAX_QUANTITY);
                merged.push(item);
            }
        }
        merged.retain(|item| item.quantity > 0);
        merged
    }
}

/// Cart listing entry returned by `GET /carts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub id: CartId,
    pub name: CartName,
}
