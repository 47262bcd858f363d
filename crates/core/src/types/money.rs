//! Display helpers for decimal prices.
//!
//! Vendor prices are always US dollars; amounts are carried as
//! `rust_decimal::Decimal` so subtotals never accumulate float error.

use rust_decimal::{Decimal, RoundingStrategy};

/// Format a dollar amount for display (e.g., `$19.99`).
///
/// ```
/// use buylist_core::display_usd;
/// use rust_decimal::Decimal;
///
/// assert_eq!(display_usd(Decimal::new(150, 2)), "$1.50");
/// assert_eq!(display_usd(Decimal::new(-5, 1)), "-$0.50");
/// ```
#[must_use]
pub fn display_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}
