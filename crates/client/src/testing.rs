//! In-memory [`BuylistBackend`] for unit tests.
//!
//! Records every call in order and lets tests inject failures and delays.
//! Delays use `tokio::time`, so tests running with paused time stay
//! deterministic.

#![allow(clippy::expect_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use buylist_core::{
    CardIdentity, Cart, CartId, CartItem, CartName, CartSummary, VendorOfferBreakdown, VendorSlug,
};

use crate::backend::{
    BackendError, BuylistBackend, ItemUpdate, SubmitRequest, SubmitResponse,
};

/// Failure a fake call can be told to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    /// HTTP 503: transient, and ambiguous for submissions.
    Unavailable,
    /// HTTP 422: terminal.
    Rejected,
    /// HTTP 401.
    Unauthorized,
}

impl FakeFailure {
    fn into_error(self) -> BackendError {
        match self {
            Self::Unavailable => BackendError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            },
            Self::Rejected => BackendError::Api {
                status: 422,
                message: "unprocessable".to_string(),
            },
            Self::Unauthorized => BackendError::Unauthorized("vendor not linked".to_string()),
        }
    }
}

#[derive(Default)]
struct FakeState {
    carts: BTreeMap<CartId, Cart>,
    next_cart_id: i32,
    offers: HashMap<CartId, Vec<VendorOfferBreakdown>>,
    offer_delays: HashMap<CartId, VecDeque<Duration>>,
    offer_failures: VecDeque<FakeFailure>,
    connected: Vec<VendorSlug>,
    connected_calls: usize,
    write_delay: Option<Duration>,
    write_delays: VecDeque<Duration>,
    write_failures: VecDeque<FakeFailure>,
    write_attempts: usize,
    item_writes: Vec<(CartId, ItemUpdate)>,
    submit_calls: Vec<SubmitRequest>,
    submit_outcome: Option<Result<SubmitResponse, FakeFailure>>,
    submit_delay: Option<Duration>,
    events: Vec<String>,
}

/// In-memory backend.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    /// Empty backend: no carts, no offers, no connected vendors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a cart.
    pub fn insert_cart(&self, name: &str, items: Vec<CartItem>) -> Cart {
        let mut state = self.state();
        state.next_cart_id += 1;
        let cart = Cart {
            id: CartId::new(state.next_cart_id),
            name: CartName::parse(name).expect("fake cart name"),
            items,
        };
        state.carts.insert(cart.id, cart.clone());
        cart
    }

    pub fn set_offers(&self, cart_id: CartId, offers: Vec<VendorOfferBreakdown>) {
        self.state().offers.insert(cart_id, offers);
    }

    /// Delay the next offer fetches of `cart_id`, one delay per fetch.
    pub fn delay_offers(&self, cart_id: CartId, delays: impl IntoIterator<Item = Duration>) {
        self.state()
            .offer_delays
            .entry(cart_id)
            .or_default()
            .extend(delays);
    }

    pub fn fail_next_offers(&self, failures: impl IntoIterator<Item = FakeFailure>) {
        self.state().offer_failures.extend(failures);
    }

    pub fn set_connected(&self, vendors: &[&str]) {
        self.state().connected = vendors.iter().map(|v| VendorSlug::new(*v)).collect();
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.state().write_delay = Some(delay);
    }

    /// Delay the next item writes, one delay per write, ahead of any fixed delay.
    pub fn delay_writes(&self, delays: impl IntoIterator<Item = Duration>) {
        self.state().write_delays.extend(delays);
    }

    pub fn fail_next_writes(&self, failures: impl IntoIterator<Item = FakeFailure>) {
        self.state().write_failures.extend(failures);
    }

    pub fn set_submit_outcome(&self, outcome: Result<SubmitResponse, FakeFailure>) {
        self.state().submit_outcome = Some(outcome);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        self.state().submit_delay = Some(delay);
    }

    /// Successful item writes, in the order they were received.
    #[must_use]
    pub fn item_writes(&self) -> Vec<(CartId, ItemUpdate)> {
        self.state().item_writes.clone()
    }

    /// Item writes received, failed ones included.
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        self.state().write_attempts
    }

    #[must_use]
    pub fn submit_calls(&self) -> Vec<SubmitRequest> {
        self.state().submit_calls.clone()
    }

    #[must_use]
    pub fn connected_calls(&self) -> usize {
        self.state().connected_calls
    }

    /// Call log, e.g. `["write 1 Forest=2", "offers 1"]`.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    /// Persisted quantity of one line.
    #[must_use]
    pub fn cart_quantity(&self, cart_id: CartId, identity: &CardIdentity) -> u32 {
        self.state()
            .carts
            .get(&cart_id)
            .and_then(|cart| cart.items.iter().find(|i| &i.identity == identity))
            .map_or(0, |item| item.quantity)
    }
}

#[async_trait]
impl BuylistBackend for FakeBackend {
    async fn list_carts(&self) -> Result<Vec<CartSummary>, BackendError> {
        Ok(self
            .state()
            .carts
            .values()
            .map(|c| CartSummary {
                id: c.id,
                name: c.name.clone(),
            })
            .collect())
    }

    async fn create_cart(&self, name: &CartName) -> Result<Cart, BackendError> {
        let mut state = self.state();
        state.next_cart_id += 1;
        let cart = Cart {
            id: CartId::new(state.next_cart_id),
            name: name.clone(),
            items: Vec::new(),
        };
        state.carts.insert(cart.id, cart.clone());
        state.events.push(format!("create {}", cart.id));
        Ok(cart)
    }

    async fn rename_cart(&self, cart_id: CartId, name: &CartName) -> Result<Cart, BackendError> {
        let mut state = self.state();
        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| BackendError::NotFound(format!("carts/{cart_id}")))?;
        cart.name = name.clone();
        Ok(cart.clone())
    }

    async fn delete_cart(&self, cart_id: CartId) -> Result<(), BackendError> {
        let mut state = self.state();
        state
            .carts
            .remove(&cart_id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("carts/{cart_id}")))
    }

    async fn get_cart(&self, cart_id: CartId) -> Result<Cart, BackendError> {
        let mut state = self.state();
        state.events.push(format!("get {cart_id}"));
        state
            .carts
            .get(&cart_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("carts/{cart_id}")))
    }

    async fn update_item(&self, cart_id: CartId, update: &ItemUpdate) -> Result<(), BackendError> {
        let delay = {
            let mut state = self.state();
            state.write_attempts += 1;
            if let Some(failure) = state.write_failures.pop_front() {
                state.events.push(format!(
                    "write-failed {cart_id} {}={}",
                    update.identity.card_name, update.quantity
                ));
                return Err(failure.into_error());
            }
            state.item_writes.push((cart_id, update.clone()));
            state.events.push(format!(
                "write {cart_id} {}={}",
                update.identity.card_name, update.quantity
            ));
            state.write_delays.pop_front().or(state.write_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        let cart = state
            .carts
            .entry(cart_id)
            .or_insert_with(|| Cart {
                id: cart_id,
                name: CartName::parse("cart").expect("fake cart name"),
                items: Vec::new(),
            });
        cart.items.retain(|i| i.identity != update.identity);
        if update.quantity > 0 {
            cart.items
                .push(CartItem::new(update.identity.clone(), update.quantity));
        }
        state.events.push(format!(
            "ack {cart_id} {}={}",
            update.identity.card_name, update.quantity
        ));
        Ok(())
    }

    async fn get_offers(&self, cart_id: CartId) -> Result<Vec<VendorOfferBreakdown>, BackendError> {
        // Offers are priced when the request arrives, not when it answers
        let (delay, failure, offers) = {
            let mut state = self.state();
            state.events.push(format!("offers {cart_id}"));
            let delay = state
                .offer_delays
                .get_mut(&cart_id)
                .and_then(VecDeque::pop_front);
            let offers = state.offers.get(&cart_id).cloned().unwrap_or_default();
            (delay, state.offer_failures.pop_front(), offers)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(failure) => Err(failure.into_error()),
            None => Ok(offers),
        }
    }

    async fn connected_vendors(&self) -> Result<Vec<VendorSlug>, BackendError> {
        let mut state = self.state();
        state.connected_calls += 1;
        Ok(state.connected.clone())
    }

    async fn submit_buylist(
        &self,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, BackendError> {
        let (delay, outcome) = {
            let mut state = self.state();
            state.submit_calls.push(request.clone());
            state
                .events
                .push(format!("submit {} {}", request.cart_id, request.vendor_slug));
            (state.submit_delay, state.submit_outcome.clone())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            Some(Ok(response)) => Ok(response),
            Some(Err(failure)) => Err(failure.into_error()),
            None => Ok(SubmitResponse {
                success: true,
                message: "Offer received".to_string(),
            }),
        }
    }
}
