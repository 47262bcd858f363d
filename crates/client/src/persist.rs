//! Cart persistence gateway: debounced, per-line writes of cart quantities.
//!
//! # Debouncing
//!
//! Every `(cart, card)` pair has its own timer. Repeated edits of one line
//! inside the window coalesce into a single write carrying the latest
//! quantity; edits of different lines never affect each other's timers.
//!
//! # Ordering
//!
//! Writes for one line go through a FIFO lane, so a later write can never
//! overtake an earlier one that is still in flight. Each caller gets a
//! [`PersistTicket`] that resolves once the write it was coalesced into has
//! been acknowledged or has finally failed.
//!
//! # Retries
//!
//! A transient failure is retried exactly once after the configured backoff.
//! Anything else is reported to the ticket holders; the gateway never
//! touches cart state itself.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use buylist_core::{CardIdentity, CartId};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::backend::{BackendError, BuylistBackend, ItemUpdate};
use crate::config::PersistConfig;

/// A line write that could not be persisted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// The backend refused the write, or failed twice.
    #[error("Failed to save {identity} (quantity {quantity}): {message}")]
    Failed {
        cart_id: CartId,
        identity: CardIdentity,
        quantity: u32,
        message: String,
        /// Whether the last failure was transient (a manual retry may work).
        transient: bool,
    },

    /// The write task ended without reporting an outcome.
    #[error("Write for {0} was abandoned")]
    Abandoned(CardIdentity),
}

impl PersistError {
    /// Whether retrying the write may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Failed { transient, .. } => *transient,
            Self::Abandoned(_) => true,
        }
    }
}

/// Outcome delivered to every caller coalesced into one write.
pub type PersistOutcome = Result<(), PersistError>;

/// Key of the debounce table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersistKey {
    pub cart_id: CartId,
    pub identity: CardIdentity,
}

/// Completion signal for a scheduled write.
#[derive(Debug)]
pub struct PersistTicket {
    identity: CardIdentity,
    receiver: oneshot::Receiver<PersistOutcome>,
}

impl PersistTicket {
    /// Wait until the write is acknowledged or has finally failed.
    ///
    /// # Errors
    ///
    /// Returns the write failure, or `PersistError::Abandoned` if the write
    /// task went away without answering.
    pub async fn wait(self) -> PersistOutcome {
        self.receiver
            .await
            .unwrap_or(Err(PersistError::Abandoned(self.identity)))
    }
}

/// Debounced write path from the cart store to the cart backend.
///
/// Cheap to clone; clones share one debounce table.
#[derive(Clone)]
pub struct PersistenceGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    backend: Arc<dyn BuylistBackend>,
    config: PersistConfig,
    state: Mutex<GatewayState>,
    lanes: Mutex<HashMap<PersistKey, Arc<tokio::sync::Mutex<()>>>>,
    generation: AtomicU64,
}

#[derive(Default)]
struct GatewayState {
    debouncing: HashMap<PersistKey, PendingWrite>,
    in_flight: HashMap<PersistKey, usize>,
}

struct PendingWrite {
    quantity: u32,
    generation: u64,
    waiters: Vec<oneshot::Sender<PersistOutcome>>,
    timer: Option<JoinHandle<()>>,
}

impl PersistenceGateway {
    /// Create a gateway writing through `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn BuylistBackend>, config: PersistConfig) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                backend,
                config,
                state: Mutex::new(GatewayState::default()),
                lanes: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Schedule a write of `quantity` for one line.
    ///
    /// Restarts that line's debounce timer. Must be called from within a
    /// Tokio runtime.
    pub fn schedule_persist(
        &self,
        cart_id: CartId,
        identity: &CardIdentity,
        quantity: u32,
    ) -> PersistTicket {
        let (sender, receiver) = oneshot::channel();
        let key = PersistKey {
            cart_id,
            identity: identity.clone(),
        };
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);

        let mut state = self.inner.state();
        let pending = state
            .debouncing
            .entry(key.clone())
            .or_insert_with(|| PendingWrite {
                quantity,
                generation,
                waiters: Vec::new(),
                timer: None,
            });

        if let Some(timer) = pending.timer.take() {
            debug!(cart_id = %cart_id, card = %identity, quantity, "Coalescing pending write");
            timer.abort();
        }
        pending.quantity = quantity;
        pending.generation = generation;
        pending.waiters.push(sender);

        let inner = Arc::clone(&self.inner);
        let debounce = self.inner.config.debounce;
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            inner.fire(key, Some(generation)).await;
        }));

        PersistTicket {
            identity: identity.clone(),
            receiver,
        }
    }

    /// Fire every debouncing write now and wait for their outcomes.
    pub async fn flush(&self) -> Vec<PersistOutcome> {
        let mut receivers = Vec::new();
        let keys: Vec<PersistKey> = {
            let mut state = self.inner.state();
            state
                .debouncing
                .iter_mut()
                .map(|(key, pending)| {
                    let (sender, receiver) = oneshot::channel();
                    pending.waiters.push(sender);
                    receivers.push(PersistTicket {
                        identity: key.identity.clone(),
                        receiver,
                    });
                    key.clone()
                })
                .collect()
        };

        for key in keys {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.fire(key, None).await });
        }

        let mut outcomes = Vec::with_capacity(receivers.len());
        for ticket in receivers {
            outcomes.push(ticket.wait().await);
        }
        outcomes
    }

    /// Lines of `cart_id` with a write that is not yet acknowledged.
    #[must_use]
    pub fn pending_keys(&self, cart_id: CartId) -> HashSet<CardIdentity> {
        let state = self.inner.state();
        state
            .debouncing
            .keys()
            .chain(state.in_flight.keys())
            .filter(|key| key.cart_id == cart_id)
            .map(|key| key.identity.clone())
            .collect()
    }

    /// Whether any write is debouncing or in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state();
        state.debouncing.is_empty() && state.in_flight.is_empty()
    }
}

impl GatewayInner {
    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lane(&self, key: &PersistKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(lanes.entry(key.clone()).or_default())
    }

    /// Drop the caller's lane and evict it once no other write holds it.
    fn release_lane(&self, key: &PersistKey, lane: Arc<tokio::sync::Mutex<()>>) {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        // Counted under the table lock: the table plus this caller
        if Arc::strong_count(&lane) <= 2 {
            lanes.remove(key);
        }
        drop(lanes);
        drop(lane);
    }

    /// Take the pending write for `key` (if `generation` is still current)
    /// and perform it.
    async fn fire(self: Arc<Self>, key: PersistKey, generation: Option<u64>) {
        let write = {
            let mut state = self.state();
            let current = state
                .debouncing
                .get(&key)
                .is_some_and(|p| generation.is_none_or(|g| p.generation == g));
            if !current {
                return;
            }
            let write = state.debouncing.remove(&key);
            *state.in_flight.entry(key.clone()).or_default() += 1;
            write
        };
        let Some(write) = write else { return };

        let lane = self.lane(&key);
        let outcome = {
            let _turn = lane.lock().await;
            self.write_with_retry(&key, write.quantity).await
        };
        self.release_lane(&key, lane);

        {
            let mut state = self.state();
            if let Some(count) = state.in_flight.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    state.in_flight.remove(&key);
                }
            }
        }

        for waiter in write.waiters {
            // A dropped ticket just means nobody is waiting
            let _ = waiter.send(outcome.clone());
        }
    }

    #[instrument(skip(self, key), fields(cart_id = %key.cart_id, card = %key.identity))]
    async fn write_with_retry(&self, key: &PersistKey, quantity: u32) -> PersistOutcome {
        let update = ItemUpdate {
            identity: key.identity.clone(),
            quantity,
        };

        let err = match self.backend.update_item(key.cart_id, &update).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() => e,
            Err(e) => return Err(failure(key, quantity, &e)),
        };

        let backoff = match err {
            BackendError::RateLimited(secs) => {
                self.config.retry_backoff.max(std::time::Duration::from_secs(secs))
            }
            _ => self.config.retry_backoff,
        };
        warn!(error = %err, backoff_ms = backoff.as_millis(), "Cart write failed, retrying once");
        tokio::time::sleep(backoff).await;

        match self.backend.update_item(key.cart_id, &update).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Cart write failed after retry");
                Err(failure(key, quantity, &e))
            }
        }
    }
}

fn failure(key: &PersistKey, quantity: u32, err: &BackendError) -> PersistError {
    PersistError::Failed {
        cart_id: key.cart_id,
        identity: key.identity.clone(),
        quantity,
        message: err.to_string(),
        transient: err.is_transient(),
    }
}
