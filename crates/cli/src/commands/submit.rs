//! Buylist submission.
//!
//! # Usage
//!
//! ```bash
//! buylist submit 4 card-kingdom --payment cash --accept-terms
//! ```
//!
//! The offer is fetched again and the vendor must still be in it. A failed
//! submission is never retried; an uncertain one says so.

use buylist_client::{BuylistError, BuylistSession, SubmissionError};
use buylist_core::{CartId, PaymentMethod, VendorSlug, WorkflowStage, display_usd};

use super::{CommandError, emit, emit_notices, offers};

/// Submit `cart_id` to `vendor`.
pub async fn submit(
    session: &BuylistSession,
    cart_id: CartId,
    vendor: &VendorSlug,
    payment_method: Option<PaymentMethod>,
    terms_accepted: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = session.vendors().name(vendor);
    offers::load(session, cart_id).await?;

    if session.choose_vendor(vendor) != WorkflowStage::FinalSubmission {
        return Err(CommandError::NoOffer(name, cart_id).into());
    }
    let breakdown = session.breakdown_for(vendor)?;
    let total = match payment_method {
        Some(PaymentMethod::StoreCredit) => breakdown.credit_subtotal,
        _ => breakdown.cash_subtotal,
    };
    tracing::info!(
        "Submitting {} card(s) to {name} for {}",
        breakdown.purchasable_units(),
        display_usd(total)
    );

    match session.submit(payment_method, terms_accepted).await {
        Ok(response) => {
            emit(format_args!("Submitted to {name}: {}", response.message));
            Ok(())
        }
        Err(e) => {
            if matches!(e, BuylistError::Submission(SubmissionError::TermsNotAccepted)) {
                tracing::info!("Pass --accept-terms to accept {name}'s terms");
            }
            emit_notices(session);
            Err(e.into())
        }
    }
}
