//! Subcommand implementations.
//!
//! Command results go to stdout as plain text; diagnostics go through
//! `tracing` like everywhere else.

pub mod carts;
pub mod offers;
pub mod quantity;
pub mod submit;
pub mod vendors;

use buylist_client::{BuylistSession, NoticeAction, NoticeKind};
use buylist_core::{CartId, VendorSlug};
use thiserror::Error;

/// Errors raised by the commands themselves, on top of session errors.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Cart {0} has no items")]
    EmptyCart(CartId),

    #[error("{0} has no offer for cart {1}")]
    NoOffer(String, CartId),

    #[error("Quantity {0} is out of range")]
    InvalidQuantity(i32),

    /// Background work failed; details were printed as notices.
    #[error("{0} problem(s) need attention")]
    Unresolved(usize),
}

/// Write one line of command output.
pub fn emit(line: impl std::fmt::Display) {
    #[allow(clippy::print_stdout)]
    {
        println!("{line}");
    }
}

/// Print the session's open notices. Returns how many were errors.
pub fn emit_notices(session: &BuylistSession) -> usize {
    let mut errors = 0;
    for notice in session.notices() {
        let label = match notice.kind {
            NoticeKind::Error => {
                errors += 1;
                "error"
            }
            NoticeKind::Warning => "warning",
            NoticeKind::Info => "info",
        };
        emit(format_args!("[{label}] {}", notice.message));
        for action in &notice.actions {
            emit(format_args!("    - {}", describe_action(session, action)));
        }
    }
    errors
}

fn describe_action(session: &BuylistSession, action: &NoticeAction) -> String {
    match action {
        NoticeAction::RetryPersist { identity, .. } => {
            format!("run the same command again to retry {identity}")
        }
        NoticeAction::RestoreQuantity {
            cart_id,
            identity,
            quantity,
        } => format!(
            "restore {identity} to {quantity} with `quantity {cart_id} ... {quantity} --absolute`"
        ),
        NoticeAction::RetryRefresh { cart_id } => format!("run `offers {cart_id}` again"),
        NoticeAction::LinkAccount { vendor } => {
            format!("link your {} account, then submit again", vendor_name(session, vendor))
        }
        NoticeAction::RetrySubmit { vendor } => format!(
            "submit to {} again only after checking with them",
            vendor_name(session, vendor)
        ),
    }
}

fn vendor_name(session: &BuylistSession, vendor: &VendorSlug) -> String {
    session.vendors().name(vendor)
}
