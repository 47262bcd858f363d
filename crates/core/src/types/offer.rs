//! Per-vendor offer breakdowns.
//!
//! Breakdowns are produced by the external pricing backend. Everything here
//! is plain data plus the derived subtotal arithmetic; price matching,
//! purchase limits and best-offer flags are never computed locally.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::card::CardIdentity;
use super::id::VendorSlug;

/// One card line in a vendor's offer.
///
/// Purchasable lines carry prices and a `purchase_quantity`; non-purchasable
/// lines carry `unable_to_purchase_quantity` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferLine {
    pub card_identity: CardIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_price: Option<Decimal>,
    #[serde(default)]
    pub purchase_quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_purchase_quantity: Option<u32>,
    #[serde(default)]
    pub is_best_cash_offer: bool,
    #[serde(default)]
    pub is_best_credit_offer: bool,
    #[serde(default)]
    pub unable_to_purchase_quantity: u32,
}

impl OfferLine {
    /// A purchasable line.
    #[must_use]
    pub const fn purchasable(
        card_identity: CardIdentity,
        cash_price: Decimal,
        credit_price: Decimal,
        purchase_quantity: u32,
        max_purchase_quantity: Option<u32>,
    ) -> Self {
        Self {
            card_identity,
            cash_price: Some(cash_price),
            credit_price: Some(credit_price),
            purchase_quantity,
            max_purchase_quantity,
            is_best_cash_offer: false,
            is_best_credit_offer: false,
            unable_to_purchase_quantity: 0,
        }
    }

    /// A line the vendor will not buy.
    #[must_use]
    pub const fn unable(card_identity: CardIdentity, unable_to_purchase_quantity: u32) -> Self {
        Self {
            card_identity,
            cash_price: None,
            credit_price: None,
            purchase_quantity: 0,
            max_purchase_quantity: None,
            is_best_cash_offer: false,
            is_best_credit_offer: false,
            unable_to_purchase_quantity,
        }
    }

    /// Units of the cart line this offer line accounts for.
    #[must_use]
    pub const fn requested_quantity(&self) -> u32 {
        self.purchase_quantity
            .saturating_add(self.unable_to_purchase_quantity)
    }

    /// `cash_price × purchase_quantity`, zero when unpriced.
    #[must_use]
    pub fn cash_total(&self) -> Decimal {
        self.cash_price.unwrap_or_default() * Decimal::from(self.purchase_quantity)
    }

    /// `credit_price × purchase_quantity`, zero when unpriced.
    #[must_use]
    pub fn credit_total(&self) -> Decimal {
        self.credit_price.unwrap_or_default() * Decimal::from(self.purchase_quantity)
    }
}

/// A vendor's willingness to buy one cart's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorOfferBreakdown {
    pub vendor_slug: VendorSlug,
    #[serde(default)]
    pub cash_subtotal: Decimal,
    #[serde(default)]
    pub credit_subtotal: Decimal,
    #[serde(default)]
    pub purchasable_lines: Vec<OfferLine>,
    #[serde(default)]
    pub non_purchasable_lines: Vec<OfferLine>,
}

impl VendorOfferBreakdown {
    /// Build a breakdown from its lines with subtotals derived.
    #[must_use]
    pub fn from_lines(
        vendor_slug: VendorSlug,
        purchasable_lines: Vec<OfferLine>,
        non_purchasable_lines: Vec<OfferLine>,
    ) -> Self {
        let mut breakdown = Self {
            vendor_slug,
            cash_subtotal: Decimal::ZERO,
            credit_subtotal: Decimal::ZERO,
            purchasable_lines,
            non_purchasable_lines,
        };
        breakdown.recompute_subtotals();
        breakdown
    }

    /// Recompute both subtotals from the purchasable lines.
    pub fn recompute_subtotals(&mut self) {
        self.cash_subtotal = self.purchasable_lines.iter().map(OfferLine::cash_total).sum();
        self.credit_subtotal = self
            .purchasable_lines
            .iter()
            .map(OfferLine::credit_total)
            .sum();
    }

    /// Total units this vendor will buy.
    #[must_use]
    pub fn purchasable_units(&self) -> u32 {
        self.purchasable_lines
            .iter()
            .map(|l| l.purchase_quantity)
            .sum()
    }

    /// Total units this vendor will not buy.
    #[must_use]
    pub fn unpurchasable_units(&self) -> u32 {
        self.non_purchasable_lines
            .iter()
            .map(|l| l.unable_to_purchase_quantity)
            .sum()
    }
}
