//! Core types for the buylist workflow.
//!
//! This module provides type-safe wrappers and plain data for carts, card
//! lines, vendor offers and workflow stages.

pub mod card;
pub mod cart_name;
pub mod id;
pub mod money;
pub mod offer;
pub mod workflow;

pub use card::{
    CardIdentity, Cart, CartItem, CartSummary, CatalogCard, MAX_QUANTITY, apply_quantity_delta,
};
pub use cart_name::{CartName, CartNameError};
pub use id::*;
pub use money::display_usd;
pub use offer::{OfferLine, VendorOfferBreakdown};
pub use workflow::{PaymentMethod, SubStage, WorkflowStage};
