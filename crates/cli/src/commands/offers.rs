//! Offer comparison.

use buylist_client::BuylistSession;
use buylist_core::{CartId, OfferLine, VendorOfferBreakdown, WorkflowStage, display_usd};

use super::{CommandError, emit};

/// Open a cart's offer overview: select it, then move to the overview,
/// which fetches offers.
pub async fn load(
    session: &BuylistSession,
    cart_id: CartId,
) -> Result<Vec<VendorOfferBreakdown>, Box<dyn std::error::Error>> {
    session.select_cart(cart_id).await?;
    if session.items().is_empty() {
        return Err(CommandError::EmptyCart(cart_id).into());
    }
    let stage = session.view_offers().await?;
    if stage != WorkflowStage::ViewAllOffers {
        tracing::warn!(stage = %stage, "Offer overview not reached");
    }
    Ok(session.offers().breakdowns)
}

/// Print every vendor's offer, best cash subtotal first.
pub async fn show(
    session: &BuylistSession,
    cart_id: CartId,
) -> Result<(), Box<dyn std::error::Error>> {
    let breakdowns = load(session, cart_id).await?;
    if breakdowns.is_empty() {
        tracing::info!("No vendor made an offer for cart {cart_id}");
        return Ok(());
    }

    for breakdown in &breakdowns {
        emit(format_args!(
            "{} ({})  cash {}  credit {}",
            session.vendors().name(&breakdown.vendor_slug),
            breakdown.vendor_slug,
            display_usd(breakdown.cash_subtotal),
            display_usd(breakdown.credit_subtotal),
        ));
        for line in &breakdown.purchasable_lines {
            emit(format_args!("  {}", purchasable(line)));
        }
        for line in &breakdown.non_purchasable_lines {
            emit(format_args!(
                "  {:>2} x {}  not buying",
                line.unable_to_purchase_quantity, line.card_identity
            ));
        }
        emit("");
    }
    Ok(())
}

fn purchasable(line: &OfferLine) -> String {
    let mut text = format!(
        "{:>2} x {}  cash {}  credit {}",
        line.purchase_quantity,
        line.card_identity,
        display_usd(line.cash_price.unwrap_or_default()),
        display_usd(line.credit_price.unwrap_or_default()),
    );
    if line.is_best_cash_offer {
        text.push_str("  [best cash]");
    }
    if line.is_best_credit_offer {
        text.push_str("  [best credit]");
    }
    if let Some(max) = line.max_purchase_quantity {
        text.push_str(&format!("  (max {max})"));
    }
    text
}
