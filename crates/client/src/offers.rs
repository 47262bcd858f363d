//! Vendor offer assembler: fetches and normalizes per-vendor breakdowns for
//! the active cart.
//!
//! Prices, purchase limits and best-offer flags come from the pricing
//! backend and are consumed as-is. What this module owns is the cache:
//!
//! - every response is normalized (one entry per vendor, purchase limits
//!   honored, subtotals recomputed, stable vendor order)
//! - every request is stamped with the cart epoch and a sequence number;
//!   a response for a cart that is no longer active, or older than the
//!   last applied one, is discarded
//! - a failed fetch keeps the previous breakdowns

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use buylist_core::{CardIdentity, CartId, OfferLine, VendorOfferBreakdown, VendorSlug};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::backend::BuylistBackend;

/// Errors raised by the offer assembler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OfferError {
    /// No breakdown has been fetched for the active cart yet.
    #[error("No offers loaded")]
    NotLoaded,

    /// The vendor has no entry in the last fetched breakdowns.
    #[error("Vendor {0} has no offer for this cart")]
    NotFound(VendorSlug),

    /// The cached breakdowns must be refetched before they are shown again.
    #[error("Offers for cart {0} are out of date")]
    Stale(CartId),

    /// The active cart changed while the fetch was in flight.
    #[error("Offers for cart {0} are no longer needed")]
    Superseded(CartId),

    /// The pricing backend failed.
    #[error("Failed to load offers: {message}")]
    Fetch { message: String, transient: bool },
}

impl OfferError {
    /// Whether the user can usefully retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch { transient, .. } => *transient,
            Self::Stale(_) | Self::NotLoaded => true,
            Self::NotFound(_) | Self::Superseded(_) => false,
        }
    }
}

/// Presentation view of the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferSnapshot {
    pub cart_id: Option<CartId>,
    pub breakdowns: Vec<VendorOfferBreakdown>,
    pub loaded: bool,
    pub stale: bool,
    pub loading: bool,
    pub last_error: Option<OfferError>,
}

#[derive(Debug, Default)]
struct OfferState {
    cart_id: Option<CartId>,
    epoch: u64,
    issued: u64,
    applied: u64,
    in_flight: usize,
    breakdowns: Vec<VendorOfferBreakdown>,
    loaded: bool,
    stale: bool,
    last_error: Option<OfferError>,
}

impl OfferState {
    fn current(&self, cart_id: CartId) -> Result<&[VendorOfferBreakdown], OfferError> {
        if !self.loaded {
            return Err(OfferError::NotLoaded);
        }
        if self.stale {
            return Err(OfferError::Stale(cart_id));
        }
        Ok(&self.breakdowns)
    }
}

/// Cached offer breakdowns of the active cart.
///
/// Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct OfferAssembler {
    backend: Arc<dyn BuylistBackend>,
    state: Arc<Mutex<OfferState>>,
}

impl OfferAssembler {
    #[must_use]
    pub fn new(backend: Arc<dyn BuylistBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(OfferState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, OfferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop cached breakdowns and start a new epoch for `cart_id`.
    ///
    /// Any fetch still in flight for the previous cart is ignored when it
    /// answers.
    pub fn set_cart(&self, cart_id: Option<CartId>) {
        let mut state = self.state();
        if state.cart_id == cart_id {
            return;
        }
        debug!(from = ?state.cart_id, to = ?cart_id, "Resetting offer cache");
        let epoch = state.epoch + 1;
        *state = OfferState {
            cart_id,
            epoch,
            ..OfferState::default()
        };
    }

    /// Fetch, normalize and cache the breakdowns of `cart_id`.
    ///
    /// Concurrent calls are allowed; the most recently issued request
    /// determines the cached value.
    ///
    /// # Errors
    ///
    /// Returns `OfferError::Superseded` if `cart_id` is not (or no longer)
    /// the active cart, or `OfferError::Fetch` if the backend failed. A
    /// failed fetch leaves the cache untouched.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn refresh_breakdown(
        &self,
        cart_id: CartId,
    ) -> Result<Vec<VendorOfferBreakdown>, OfferError> {
        let (epoch, seq) = {
            let mut state = self.state();
            if state.cart_id != Some(cart_id) {
                return Err(OfferError::Superseded(cart_id));
            }
            state.issued += 1;
            state.in_flight += 1;
            (state.epoch, state.issued)
        };

        let response = self.backend.get_offers(cart_id).await;

        let mut state = self.state();
        if state.epoch != epoch {
            warn!(seq, "Discarding offers for a cart that is no longer active");
            return Err(OfferError::Superseded(cart_id));
        }
        state.in_flight -= 1;

        if seq <= state.applied {
            warn!(seq, applied = state.applied, "Discarding out-of-order offer response");
            return match response {
                Ok(_) => Ok(state.breakdowns.clone()),
                Err(e) => Err(OfferError::Fetch {
                    message: e.to_string(),
                    transient: e.is_transient(),
                }),
            };
        }

        match response {
            Ok(raw) => {
                let breakdowns = normalize(raw);
                debug!(vendors = breakdowns.len(), seq, "Offers refreshed");
                state.breakdowns.clone_from(&breakdowns);
                state.applied = seq;
                state.loaded = true;
                state.stale = false;
                state.last_error = None;
                Ok(breakdowns)
            }
            Err(e) => {
                tracing::error!(error = %e, "Offer refresh failed, keeping previous offers");
                let err = OfferError::Fetch {
                    message: e.to_string(),
                    transient: e.is_transient(),
                };
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// The breakdown of one vendor from the last fetch.
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded` before the first fetch, `Stale` after
    /// [`mark_stale`](Self::mark_stale), or `NotFound` if the vendor is not
    /// in the set.
    pub fn get_breakdown_for(&self, slug: &VendorSlug) -> Result<VendorOfferBreakdown, OfferError> {
        let state = self.state();
        let cart_id = state.cart_id.ok_or(OfferError::NotLoaded)?;
        state
            .current(cart_id)?
            .iter()
            .find(|b| &b.vendor_slug == slug)
            .cloned()
            .ok_or_else(|| OfferError::NotFound(slug.clone()))
    }

    /// Whether `slug` is in the last fetched, still current, breakdowns.
    #[must_use]
    pub fn contains_vendor(&self, slug: &VendorSlug) -> bool {
        self.get_breakdown_for(slug).is_ok()
    }

    /// Keep the cached breakdowns of `cart_id` but require a refetch before
    /// they are used again.
    ///
    /// Responses to requests issued before this call are ignored.
    pub fn mark_stale(&self, cart_id: CartId) {
        let mut state = self.state();
        if state.cart_id != Some(cart_id) {
            return;
        }
        debug!(cart_id = %cart_id, "Marking offers stale");
        state.stale = true;
        state.applied = state.issued;
    }

    /// Whether a fetch is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state().in_flight > 0
    }

    /// The error of the last failed fetch, cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<OfferError> {
        self.state().last_error.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> OfferSnapshot {
        let state = self.state();
        OfferSnapshot {
            cart_id: state.cart_id,
            breakdowns: state.breakdowns.clone(),
            loaded: state.loaded,
            stale: state.stale,
            loading: state.in_flight > 0,
            last_error: state.last_error.clone(),
        }
    }
}

/// Normalize a pricing response.
///
/// Duplicate vendors collapse to the later entry. Per vendor, empty lines
/// are dropped, purchase quantities above the vendor's limit are capped with
/// the excess moved to a non-purchasable line, and subtotals are
/// recomputed. Vendors are ordered by cash subtotal, highest first.
#[must_use]
pub fn normalize(raw: Vec<VendorOfferBreakdown>) -> Vec<VendorOfferBreakdown> {
    let mut index: HashMap<VendorSlug, usize> = HashMap::with_capacity(raw.len());
    let mut vendors: Vec<VendorOfferBreakdown> = Vec::with_capacity(raw.len());

    for breakdown in raw {
        let breakdown = normalize_vendor(breakdown);
        if let Some(&i) = index.get(&breakdown.vendor_slug) {
            debug!(vendor = %breakdown.vendor_slug, "Duplicate vendor in offer response");
            vendors[i] = breakdown;
        } else {
            index.insert(breakdown.vendor_slug.clone(), vendors.len());
            vendors.push(breakdown);
        }
    }

    vendors.sort_by(|a, b| {
        b.cash_subtotal
            .cmp(&a.cash_subtotal)
            .then_with(|| a.vendor_slug.cmp(&b.vendor_slug))
    });
    vendors
}

fn normalize_vendor(breakdown: VendorOfferBreakdown) -> VendorOfferBreakdown {
    let mut unable: Vec<OfferLine> = breakdown
        .non_purchasable_lines
        .into_iter()
        .filter(|line| line.requested_quantity() > 0)
        .collect();
    let mut purchasable = Vec::with_capacity(breakdown.purchasable_lines.len());

    for mut line in breakdown.purchasable_lines {
        if let Some(max) = line.max_purchase_quantity {
            if line.purchase_quantity > max {
                add_unable(&mut unable, &line.card_identity, line.purchase_quantity - max);
                line.purchase_quantity = max;
            }
        }
        if line.unable_to_purchase_quantity > 0 {
            add_unable(&mut unable, &line.card_identity, line.unable_to_purchase_quantity);
            line.unable_to_purchase_quantity = 0;
        }
        if line.purchase_quantity > 0 {
            purchasable.push(line);
        }
    }

    VendorOfferBreakdown::from_lines(breakdown.vendor_slug, purchasable, unable)
}

fn add_unable(lines: &mut Vec<OfferLine>, identity: &CardIdentity, quantity: u32) {
    if let Some(line) = lines.iter_mut().find(|l| &l.card_identity == identity) {
        line.unable_to_purchase_quantity = line
            .unable_to_purchase_quantity
            .saturating_add(quantity);
    } else {
        lines.push(OfferLine::unable(identity.clone(), quantity));
    }
}
