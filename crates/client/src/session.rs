//! Buylist session: the one controller that owns every component and wires
//! the data flow between them.
//!
//! ```text
//! edit -> CartStore (optimistic) -> PersistenceGateway (debounced write)
//!      -> write acknowledged -> OfferAssembler refresh (ViewAllOffers only)
//!      -> WorkflowMachine revalidates the selected vendor
//! ```
//!
//! Quantity edits return immediately with the new local quantity. The write
//! and the follow-up refresh run on spawned tasks; their failures end up on
//! the [`NoticeBoard`], never in the edit's return value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use buylist_core::{
    CardIdentity, Cart, CartId, CartItem, CartName, CartSummary, CatalogCard, PaymentMethod,
    VendorOfferBreakdown, VendorSlug, WorkflowStage,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::backend::{BuylistBackend, HttpBackend, SubmitResponse};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::notices::{Notice, NoticeBoard, NoticeKind};
use crate::offers::{OfferAssembler, OfferError, OfferSnapshot};
use crate::persist::{PersistKey, PersistOutcome, PersistenceGateway};
use crate::store::{CartStore, QuantityChange, StoreError};
use crate::submission::{SubmissionCoordinator, SubmissionError, SubmissionRequest};
use crate::vendors::VendorDirectory;
use crate::workflow::{
    Preconditions, WorkflowEffect, WorkflowEvent, WorkflowMachine, WorkflowState,
};

/// One user's buylist session.
///
/// Cheap to clone; clones drive the same session. Quantity edits spawn
/// tasks, so they must be made from within a Tokio runtime.
#[derive(Clone)]
pub struct BuylistSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    backend: Arc<dyn BuylistBackend>,
    store: Mutex<CartStore>,
    workflow: Mutex<WorkflowMachine>,
    persist: PersistenceGateway,
    offers: OfferAssembler,
    submission: SubmissionCoordinator,
    vendors: VendorDirectory,
    notices: NoticeBoard,
    /// Latest unacknowledged edit per line.
    edits: Mutex<HashMap<PersistKey, LineEdit>>,
    edit_seq: AtomicU64,
    selection_seq: AtomicU64,
    follow_ups: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug, Clone, Copy)]
struct LineEdit {
    seq: u64,
    /// Quantity before the first unacknowledged edit.
    baseline: u32,
}

impl BuylistSession {
    /// Create a session over `backend`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn BuylistBackend>,
        config: &ClientConfig,
        vendors: VendorDirectory,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                persist: PersistenceGateway::new(Arc::clone(&backend), config.persist),
                offers: OfferAssembler::new(Arc::clone(&backend)),
                submission: SubmissionCoordinator::new(
                    Arc::clone(&backend),
                    config.connected_vendors_ttl,
                ),
                backend,
                store: Mutex::new(CartStore::new()),
                workflow: Mutex::new(WorkflowMachine::new()),
                vendors,
                notices: NoticeBoard::new(),
                edits: Mutex::new(HashMap::new()),
                edit_seq: AtomicU64::new(0),
                selection_seq: AtomicU64::new(0),
                follow_ups: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a session talking to the HTTP backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the vendor
    /// directory file cannot be loaded.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let backend = HttpBackend::new(&config.backend)?;
        let vendors = VendorDirectory::load_or_builtin(config.vendor_directory_path.as_deref())?;
        Ok(Self::new(Arc::new(backend), config, vendors))
    }

    // =========================================================================
    // Carts
    // =========================================================================

    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn list_carts(&self) -> Result<Vec<CartSummary>> {
        Ok(self.inner.backend.list_carts().await?)
    }

    /// Create a cart and make it the active one.
    ///
    /// # Errors
    ///
    /// Returns `CartName` if the name is empty or too long (nothing is
    /// sent), or the backend error.
    #[instrument(skip(self))]
    pub async fn create_cart(&self, name: &str) -> Result<Cart> {
        let name = CartName::parse(name)?;
        let cart = self.inner.backend.create_cart(&name).await?;
        info!(cart_id = %cart.id, "Cart created");
        self.inner.selection_seq.fetch_add(1, Ordering::AcqRel);
        self.inner.activate(&cart);
        Ok(cart)
    }

    /// # Errors
    ///
    /// Returns `CartName` if the name is invalid, or the backend error.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn rename_cart(&self, cart_id: CartId, name: &str) -> Result<Cart> {
        let name = CartName::parse(name)?;
        Ok(self.inner.backend.rename_cart(cart_id, &name).await?)
    }

    /// Delete a cart. Deleting the active cart returns to the cart list.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn delete_cart(&self, cart_id: CartId) -> Result<()> {
        self.inner.backend.delete_cart(cart_id).await?;

        let was_active = {
            let mut store = self.inner.store();
            let active = store.active_cart() == Some(cart_id);
            if active {
                store.set_active_cart(None);
            }
            active
        };
        if was_active {
            self.inner.offers.set_cart(None);
            self.inner.apply(&WorkflowEvent::ReturnToCartList);
            self.inner.apply(&WorkflowEvent::Revalidate);
        }
        Ok(())
    }

    /// Fetch a cart and make it the active one.
    ///
    /// If another cart is selected while the fetch is in flight, the later
    /// selection wins and this one is not applied.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the active cart is then unchanged.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn select_cart(&self, cart_id: CartId) -> Result<Cart> {
        let selection = self.inner.selection_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let cart = self.inner.backend.get_cart(cart_id).await?;

        if self.inner.selection_seq.load(Ordering::Acquire) == selection {
            self.inner.activate(&cart);
        } else {
            warn!("Discarding cart selection superseded by a newer one");
        }
        Ok(cart)
    }

    /// Refetch the active cart, keeping lines with unacknowledged writes.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveCart` or the backend error.
    pub async fn reload_cart(&self) -> Result<Vec<CartItem>> {
        let cart_id = self.active_cart().ok_or(StoreError::NoActiveCart)?;
        let cart = self.inner.backend.get_cart(cart_id).await?;
        let pending = self.inner.persist.pending_keys(cart_id);
        let mut store = self.inner.store();
        store.reconcile(&cart, &pending);
        Ok(store.items())
    }

    // =========================================================================
    // Quantities
    // =========================================================================

    /// Apply a signed delta to a line of the active cart.
    ///
    /// Returns the new local quantity at once; the write happens in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveCart` if no cart is active.
    pub fn upsert_item(&self, identity: &CardIdentity, delta: i32) -> Result<u32> {
        let change = self.inner.store().upsert_item(identity, delta)?;
        Ok(self.inner.commit(change))
    }

    /// [`upsert_item`](Self::upsert_item) for a card picked from the catalog.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveCart` if no cart is active.
    pub fn add_card(&self, card: &CatalogCard, delta: i32) -> Result<u32> {
        let change = self.inner.store().upsert_card(card, delta)?;
        Ok(self.inner.commit(change))
    }

    /// Set a line to an absolute quantity.
    ///
    /// # Errors
    ///
    /// Returns `QuantityOutOfRange` above 99 (nothing is written), or
    /// `NoActiveCart`.
    pub fn set_quantity(&self, identity: &CardIdentity, quantity: u32) -> Result<u32> {
        let change = self.inner.store().set_quantity(identity, quantity)?;
        Ok(self.inner.commit(change))
    }

    /// Write the current local quantity of a line again, e.g. after a
    /// failure notice.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveCart` if no cart is active.
    pub fn retry_persist(&self, identity: &CardIdentity) -> Result<()> {
        let (cart_id, quantity) = {
            let store = self.inner.store();
            let cart_id = store.active_cart().ok_or(StoreError::NoActiveCart)?;
            (cart_id, store.get_quantity(identity))
        };
        self.inner.notices.resolve_line(cart_id, identity);
        self.inner.enqueue(QuantityChange {
            cart_id,
            identity: identity.clone(),
            previous: quantity,
            quantity,
        });
        Ok(())
    }

    /// Put a line back to `quantity` (the value a failure notice carries)
    /// and write it.
    ///
    /// # Errors
    ///
    /// Returns `QuantityOutOfRange` or `NoActiveCart`.
    pub fn restore_quantity(&self, identity: &CardIdentity, quantity: u32) -> Result<u32> {
        let change = self.inner.store().set_quantity(identity, quantity)?;
        self.inner.notices.resolve_line(change.cart_id, identity);
        self.inner.enqueue(change);
        Ok(quantity)
    }

    /// Write every pending line now and wait for the writes and their
    /// follow-ups.
    pub async fn flush(&self) -> Vec<PersistOutcome> {
        let outcomes = self.inner.persist.flush().await;
        self.settle().await;
        outcomes
    }

    /// Wait for every spawned follow-up (write acknowledgement handling and
    /// the refresh it triggers) to finish. Debounce timers run their course.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.follow_ups());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Cart write follow-up task failed");
                }
            }
        }
    }

    // =========================================================================
    // Offers and workflow
    // =========================================================================

    /// Move from search results to the offer overview and fetch offers.
    ///
    /// Ignored (returns the unchanged stage) unless the active cart has
    /// items and the session is on search results.
    ///
    /// # Errors
    ///
    /// Returns the offer fetch error; the stage still changes.
    pub async fn view_offers(&self) -> Result<WorkflowStage> {
        let effects = self.inner.apply(&WorkflowEvent::ViewOffers);
        self.inner.run_effects(&effects).await?;
        Ok(self.stage())
    }

    /// Refetch offers for the active cart.
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded` without an active cart, or the fetch error (the
    /// previous offers are kept).
    pub async fn refresh_offers(&self) -> Result<Vec<VendorOfferBreakdown>> {
        Ok(self.inner.refresh_active().await?)
    }

    /// Pick a vendor's offer for review. Ignored unless on the offer
    /// overview and the vendor is in the current offers.
    pub fn choose_vendor(&self, vendor: &VendorSlug) -> WorkflowStage {
        self.inner.apply(&WorkflowEvent::ChooseVendor(vendor.clone()));
        self.stage()
    }

    /// Jump to search results. Returns the effects the caller must run
    /// (filter reset, card search).
    pub fn search(&self, query: &str) -> Vec<WorkflowEffect> {
        self.inner.apply(&WorkflowEvent::Search(query.to_string()))
    }

    pub fn return_to_cart_list(&self) {
        self.inner.apply(&WorkflowEvent::ReturnToCartList);
    }

    /// Submit the reviewed vendor offer.
    ///
    /// Pending line writes of the cart are flushed first so the vendor sees
    /// the quantities that were priced.
    ///
    /// # Errors
    ///
    /// Returns `NoVendorSelected` outside the review stage, a failed line
    /// write, or the submission error. Failures keep the review stage.
    #[instrument(skip(self))]
    pub async fn submit(
        &self,
        payment_method: Option<PaymentMethod>,
        terms_accepted: bool,
    ) -> Result<SubmitResponse> {
        let (cart_id, vendor) = {
            let workflow = self.inner.workflow();
            let state = workflow.state();
            match (state.stage, state.cart_id, state.selected_vendor.clone()) {
                (WorkflowStage::FinalSubmission, Some(cart_id), Some(vendor)) => (cart_id, vendor),
                _ => return Err(SubmissionError::NoVendorSelected.into()),
            }
        };

        let request = SubmissionRequest {
            cart_id,
            vendor,
            payment_method,
            terms_accepted,
        };
        request.validate()?;

        if !self.inner.persist.pending_keys(cart_id).is_empty() {
            debug!("Flushing pending cart writes before submitting");
            for outcome in self.flush().await {
                outcome?;
            }
        }

        let result = self.inner.submission.submit(&request).await;
        match &result {
            Ok(response) => {
                self.inner.offers.mark_stale(cart_id);
                self.inner.apply(&WorkflowEvent::SubmissionSucceeded);
                self.inner
                    .notices
                    .post(Notice::new(NoticeKind::Info, response.message.clone()));
            }
            Err(err) => {
                self.inner.apply(&WorkflowEvent::SubmissionFailed);
                match err {
                    SubmissionError::VendorNotConnected(slug) => {
                        self.inner
                            .notices
                            .post(Notice::link_account(slug, &self.inner.vendors.name(slug)));
                    }
                    SubmissionError::Ambiguous { message, .. } => {
                        self.inner
                            .notices
                            .post(Notice::submission_uncertain(&request.vendor, message));
                    }
                    _ => {}
                }
            }
        }
        result.map_err(Into::into)
    }

    /// Vendors the user has linked accounts with.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn connected_vendors(&self) -> Result<Vec<VendorSlug>> {
        let connected = self.inner.submission.connected_vendors().await?;
        let mut vendors: Vec<VendorSlug> = connected.iter().cloned().collect();
        vendors.sort();
        Ok(vendors)
    }

    // =========================================================================
    // State
    // =========================================================================

    #[must_use]
    pub fn active_cart(&self) -> Option<CartId> {
        self.inner.store().active_cart()
    }

    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.inner.store().items()
    }

    #[must_use]
    pub fn get_quantity(&self, identity: &CardIdentity) -> u32 {
        self.inner.store().get_quantity(identity)
    }

    #[must_use]
    pub fn stage(&self) -> WorkflowStage {
        self.inner.workflow().stage()
    }

    #[must_use]
    pub fn workflow_state(&self) -> WorkflowState {
        self.inner.workflow().state().clone()
    }

    #[must_use]
    pub fn offers(&self) -> OfferSnapshot {
        self.inner.offers.snapshot()
    }

    /// # Errors
    ///
    /// Returns `NotLoaded`, `Stale` or `NotFound`.
    pub fn breakdown_for(&self, vendor: &VendorSlug) -> Result<VendorOfferBreakdown> {
        Ok(self.inner.offers.get_breakdown_for(vendor)?)
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.inner.notices.list()
    }

    pub fn dismiss_notice(&self, id: Uuid) -> bool {
        self.inner.notices.dismiss(id)
    }

    #[must_use]
    pub fn vendors(&self) -> &VendorDirectory {
        &self.inner.vendors
    }
}

impl SessionInner {
    fn store(&self) -> MutexGuard<'_, CartStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn workflow(&self) -> MutexGuard<'_, WorkflowMachine> {
        self.workflow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn edits(&self) -> MutexGuard<'_, HashMap<PersistKey, LineEdit>> {
        self.edits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn follow_ups(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.follow_ups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn preconditions(&self) -> Preconditions {
        let (active_cart, has_items) = {
            let store = self.store();
            (store.active_cart(), store.has_items())
        };
        let offers = self.offers.snapshot();
        let offered_vendors = if offers.loaded && !offers.stale && offers.cart_id == active_cart {
            offers
                .breakdowns
                .into_iter()
                .map(|b| b.vendor_slug)
                .collect()
        } else {
            Default::default()
        };
        Preconditions {
            active_cart,
            has_items,
            offered_vendors,
        }
    }

    fn apply(&self, event: &WorkflowEvent) -> Vec<WorkflowEffect> {
        let pre = self.preconditions();
        self.workflow().apply(event, &pre)
    }

    async fn run_effects(&self, effects: &[WorkflowEffect]) -> std::result::Result<(), OfferError> {
        for effect in effects {
            if *effect == WorkflowEffect::RefreshOffers {
                self.refresh_active().await?;
            }
        }
        Ok(())
    }

    async fn refresh_active(&self) -> std::result::Result<Vec<VendorOfferBreakdown>, OfferError> {
        let cart_id = self.store().active_cart().ok_or(OfferError::NotLoaded)?;
        let breakdowns = self.offers.refresh_breakdown(cart_id).await?;
        self.apply(&WorkflowEvent::Revalidate);
        Ok(breakdowns)
    }

    /// Switch the session to `cart`.
    fn activate(&self, cart: &Cart) {
        let pending = self.persist.pending_keys(cart.id);
        {
            let mut store = self.store();
            store.set_active_cart(Some(cart.id));
            store.reconcile(cart, &pending);
        }
        self.offers.set_cart(Some(cart.id));
        self.apply(&WorkflowEvent::ReturnToCartList);
        self.apply(&WorkflowEvent::SelectCart(cart.id));
        debug!(cart_id = %cart.id, items = cart.items.len(), "Cart activated");
    }

    /// Schedule the write for a local change, unless nothing changed.
    fn commit(self: &Arc<Self>, change: QuantityChange) -> u32 {
        let quantity = change.quantity;
        if change.is_noop() {
            debug!(card = %change.identity, quantity, "Quantity unchanged, nothing to write");
        } else {
            self.enqueue(change);
        }
        quantity
    }

    fn enqueue(self: &Arc<Self>, change: QuantityChange) {
        let key = PersistKey {
            cart_id: change.cart_id,
            identity: change.identity.clone(),
        };
        let seq = self.edit_seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.edits()
            .entry(key.clone())
            .and_modify(|edit| edit.seq = seq)
            .or_insert(LineEdit {
                seq,
                baseline: change.previous,
            });

        let ticket = self
            .persist
            .schedule_persist(change.cart_id, &change.identity, change.quantity);

        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = ticket.wait().await;
            inner.after_write(key, seq, outcome).await;
        });

        let mut follow_ups = self.follow_ups();
        follow_ups.retain(|h| !h.is_finished());
        follow_ups.push(handle);
    }

    /// Handle the outcome of the write carrying edit `seq`.
    async fn after_write(&self, key: PersistKey, seq: u64, outcome: PersistOutcome) {
        let edit = {
            let mut edits = self.edits();
            match edits.get(&key).copied() {
                Some(edit) if edit.seq == seq => {
                    if outcome.is_ok() {
                        edits.remove(&key);
                    }
                    Some(edit)
                }
                _ => None,
            }
        };
        // A newer edit of this line is queued; its own follow-up takes over
        let Some(edit) = edit else {
            return;
        };

        let active = self.store().active_cart();
        if active != Some(key.cart_id) {
            if let Err(err) = &outcome {
                let mut edits = self.edits();
                if edits.get(&key).is_some_and(|e| e.seq == seq) {
                    edits.remove(&key);
                }
                drop(edits);
                warn!(
                    cart_id = %key.cart_id,
                    error = %err,
                    "Write failed for a cart that is no longer active"
                );
            }
            return;
        }

        match outcome {
            Ok(()) => {
                self.notices.resolve_line(key.cart_id, &key.identity);
                let stage = self.workflow().stage();
                if stage == WorkflowStage::ViewAllOffers {
                    self.refresh_in_background(key.cart_id).await;
                }
            }
            Err(err) => {
                self.notices.post(Notice::persist_failed(
                    &err,
                    key.cart_id,
                    &key.identity,
                    edit.baseline,
                ));
            }
        }
    }

    async fn refresh_in_background(&self, cart_id: CartId) {
        match self.offers.refresh_breakdown(cart_id).await {
            Ok(_) => {
                self.apply(&WorkflowEvent::Revalidate);
            }
            Err(OfferError::Superseded(_)) => {
                debug!(cart_id = %cart_id, "Offer refresh superseded by a cart switch");
            }
            Err(err) => {
                self.notices.post(Notice::refresh_failed(&err, cart_id));
            }
        }
    }
}
