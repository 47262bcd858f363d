//! Linked vendor accounts.

use buylist_client::{BuylistSession, Result};

use super::emit;

/// List the vendors a buylist can be submitted to.
pub async fn list(session: &BuylistSession) -> Result<()> {
    let connected = session.connected_vendors().await?;
    if connected.is_empty() {
        tracing::info!("No linked vendor accounts. Link one before submitting a buylist");
        return Ok(());
    }
    for slug in &connected {
        emit(format_args!("{:<20} {}", slug, session.vendors().name(slug)));
    }
    Ok(())
}
