//! Quantity edits.
//!
//! The session writes edits in the background; a one-shot command flushes
//! them before exiting so nothing is lost.

use buylist_client::BuylistSession;
use buylist_core::{CardIdentity, CartId, MAX_QUANTITY};

use super::{CommandError, emit, emit_notices};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Apply a signed change to one line.
pub async fn adjust(
    session: &BuylistSession,
    cart_id: CartId,
    identity: &CardIdentity,
    delta: i32,
) -> CommandResult {
    session.select_cart(cart_id).await?;
    let before = session.get_quantity(identity);
    let after = session.upsert_item(identity, delta)?;
    if after == before {
        tracing::info!("{identity} already at {after}, nothing to write");
    }
    finish(session, identity).await
}

/// Set one line to an absolute quantity.
pub async fn set(
    session: &BuylistSession,
    cart_id: CartId,
    identity: &CardIdentity,
    quantity: i32,
) -> CommandResult {
    let quantity = u32::try_from(quantity)
        .ok()
        .filter(|q| *q <= MAX_QUANTITY)
        .ok_or(CommandError::InvalidQuantity(quantity))?;

    session.select_cart(cart_id).await?;
    session.set_quantity(identity, quantity)?;
    finish(session, identity).await
}

async fn finish(session: &BuylistSession, identity: &CardIdentity) -> CommandResult {
    session.flush().await;
    emit(format_args!("{:>2} x {identity}", session.get_quantity(identity)));

    match emit_notices(session) {
        0 => Ok(()),
        errors => Err(CommandError::Unresolved(errors).into()),
    }
}
