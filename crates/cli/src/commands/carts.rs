//! Cart management commands.
//!
//! # Usage
//!
//! ```bash
//! buylist carts list
//! buylist carts create "Binder sell-off"
//! buylist carts rename 4 "Bulk commons"
//! buylist carts delete 4
//! buylist carts show 4
//! ```

use buylist_client::{BuylistSession, Result};
use buylist_core::CartId;

use super::emit;

/// List the user's carts.
pub async fn list(session: &BuylistSession) -> Result<()> {
    let carts = session.list_carts().await?;
    if carts.is_empty() {
        tracing::info!("No carts yet. Create one with `buylist carts create <name>`");
        return Ok(());
    }
    for cart in carts {
        emit(format_args!("{:>6}  {}", cart.id, cart.name));
    }
    Ok(())
}

/// Create an empty cart.
pub async fn create(session: &BuylistSession, name: &str) -> Result<()> {
    let cart = session.create_cart(name).await?;
    tracing::info!("Cart created! ID: {}, Name: {}", cart.id, cart.name);
    emit(cart.id);
    Ok(())
}

pub async fn rename(session: &BuylistSession, cart_id: CartId, name: &str) -> Result<()> {
    let cart = session.rename_cart(cart_id, name).await?;
    tracing::info!("Cart {} renamed to {}", cart.id, cart.name);
    Ok(())
}

pub async fn delete(session: &BuylistSession, cart_id: CartId) -> Result<()> {
    session.delete_cart(cart_id).await?;
    tracing::info!("Cart {cart_id} deleted");
    Ok(())
}

/// Print a cart's lines.
pub async fn show(session: &BuylistSession, cart_id: CartId) -> Result<()> {
    let cart = session.select_cart(cart_id).await?;
    emit(format_args!("{} ({})", cart.name, cart.id));

    let items = session.items();
    if items.is_empty() {
        emit("  (empty)");
        return Ok(());
    }
    for item in &items {
        emit(format_args!("  {:>2} x {}", item.quantity, item.identity));
    }
    let units: u32 = items.iter().map(|item| item.quantity).sum();
    emit(format_args!("  {} line(s), {units} card(s)", items.len()));
    Ok(())
}
