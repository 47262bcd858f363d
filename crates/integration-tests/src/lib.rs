//! Integration tests for the buylist client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p buylist-integration-tests
//! ```
//!
//! No external services are needed: [`FakeBuylistServer`] serves the cart,
//! offer, vendor-connection and submission endpoints from memory on an
//! ephemeral port, and the tests drive it through the real `HttpBackend`.
//!
//! # Pricing
//!
//! Offers are computed from per-vendor quotes keyed by card name. A vendor
//! with at least one quote makes an offer for every cart: quoted cards are
//! bought up to the quote's limit, everything else is reported as not
//! purchasable. Lines over the limit come back split inline, the way the
//! pricing backend reports them.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use buylist_client::backend::{CartNameBody, ItemUpdate, SubmitRequest};
use buylist_client::{ClientConfig, PersistConfig, SubmitResponse};
use buylist_core::{
    Cart, CartId, CartItem, CartSummary, OfferLine, VendorOfferBreakdown, VendorSlug,
};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

/// Endpoints of the fake, for request counts and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    ListCarts,
    CreateCart,
    RenameCart,
    DeleteCart,
    GetCart,
    UpdateItem,
    Offers,
    ConnectedVendors,
    Submit,
}

/// A canned failure answered instead of the real response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    Status(u16),
    /// `429` with a `Retry-After` header.
    RateLimited(u64),
}

/// What a vendor pays for one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub cash: Decimal,
    pub credit: Decimal,
    pub max_quantity: Option<u32>,
}

/// A submission as the fake received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub submission_id: Option<String>,
    pub cart_id: CartId,
    pub vendor_slug: VendorSlug,
    pub payment_method: buylist_core::PaymentMethod,
}

/// Errors starting the fake server.
#[derive(Debug, Error)]
pub enum FakeServerError {
    #[error("Failed to bind fake backend: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid fake backend URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
enum FakeError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Missing or wrong bearer token")]
    Unauthorized,
    #[error("Injected failure")]
    Injected(Injected),
}

impl IntoResponse for FakeError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()).into_response(),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()).into_response(),
            Self::Injected(Injected::RateLimited(seconds)) => {
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
                response
            }
            Self::Injected(Injected::Status(status)) => {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, format!("injected {status}")).into_response()
            }
        }
    }
}

type FakeResult<T> = Result<T, FakeError>;

#[derive(Default)]
struct Backend {
    next_cart_id: i32,
    carts: BTreeMap<CartId, Cart>,
    quotes: BTreeMap<VendorSlug, HashMap<String, Quote>>,
    connected: Vec<VendorSlug>,
    rejection: Option<String>,
    token: Option<String>,
    failures: HashMap<Route, VecDeque<Injected>>,
    requests: HashMap<Route, usize>,
    item_writes: Vec<(CartId, ItemUpdate)>,
    submissions: Vec<RecordedSubmission>,
}

/// Shared state of the fake. Cheap to clone.
#[derive(Clone, Default)]
pub struct FakeState {
    inner: Arc<Mutex<Backend>>,
}

impl FakeState {
    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the request, check the token, and pop an injected failure.
    fn enter(&self, route: Route, headers: &HeaderMap) -> FakeResult<MutexGuard<'_, Backend>> {
        let mut backend = self.backend();
        *backend.requests.entry(route).or_default() += 1;

        if let Some(token) = &backend.token {
            let expected = format!("Bearer {token}");
            let given = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            if given != Some(expected.as_str()) {
                return Err(FakeError::Unauthorized);
            }
        }

        if let Some(failure) = backend
            .failures
            .get_mut(&route)
            .and_then(VecDeque::pop_front)
        {
            return Err(FakeError::Injected(failure));
        }
        Ok(backend)
    }
}

/// In-memory buylist backend served over HTTP.
pub struct FakeBuylistServer {
    state: FakeState,
    base_url: Url,
    handle: JoinHandle<()>,
}

impl FakeBuylistServer {
    /// Serve the fake on `127.0.0.1` with an OS-assigned port. Endpoints live
    /// under `/api/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> Result<Self, FakeServerError> {
        let state = FakeState::default();
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let base_url = Url::parse(&format!("http://{addr}/api/"))?;

        let app = Router::new().nest("/api", routes()).with_state(state.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Fake backend stopped");
            }
        });
        tracing::debug!(%addr, "Fake backend listening");

        Ok(Self {
            state,
            base_url,
            handle,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> Url {
        self.base_url.clone()
    }

    /// Client configuration pointing at this server, with short debounce
    /// and backoff so tests run quickly.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::for_base_url(self.base_url());
        config.persist = PersistConfig {
            debounce: Duration::from_millis(20),
            retry_backoff: Duration::from_millis(10),
        };
        config
    }

    /// Require `Authorization: Bearer <token>` on every request.
    pub fn require_token(&self, token: &str) {
        self.state.backend().token = Some(token.to_string());
    }

    /// Add a card quote for a vendor.
    pub fn quote(&self, vendor: &str, card_name: &str, quote: Quote) {
        self.state
            .backend()
            .quotes
            .entry(VendorSlug::new(vendor))
            .or_default()
            .insert(card_name.to_string(), quote);
    }

    pub fn connect_vendor(&self, vendor: &str) {
        self.state.backend().connected.push(VendorSlug::new(vendor));
    }

    /// Answer submissions with `{success: false, message}`.
    pub fn reject_submissions(&self, message: &str) {
        self.state.backend().rejection = Some(message.to_string());
    }

    /// Answer the next requests to `route` with `failures`, in order.
    pub fn fail_next(&self, route: Route, failures: impl IntoIterator<Item = Injected>) {
        self.state
            .backend()
            .failures
            .entry(route)
            .or_default()
            .extend(failures);
    }

    /// Requests received on `route`, failed ones included.
    #[must_use]
    pub fn requests(&self, route: Route) -> usize {
        self.state
            .backend()
            .requests
            .get(&route)
            .copied()
            .unwrap_or(0)
    }

    /// Line writes that were applied, oldest first.
    #[must_use]
    pub fn item_writes(&self) -> Vec<(CartId, ItemUpdate)> {
        self.state.backend().item_writes.clone()
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state.backend().submissions.clone()
    }

    /// Persisted state of a cart.
    #[must_use]
    pub fn cart(&self, cart_id: CartId) -> Option<Cart> {
        self.state.backend().carts.get(&cart_id).cloned()
    }
}

impl Drop for FakeBuylistServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn routes() -> Router<FakeState> {
    Router::new()
        .route("/carts", get(list_carts).post(create_cart))
        .route(
            "/carts/{id}",
            get(get_cart).patch(rename_cart).delete(delete_cart),
        )
        .route("/carts/{id}/items", patch(update_item))
        .route("/carts/{id}/offers", get(offers))
        .route("/connected-vendors", get(connected_vendors))
        .route("/buylists/submit", post(submit))
}

// =============================================================================
// Carts
// =============================================================================

async fn list_carts(
    State(state): State<FakeState>,
    headers: HeaderMap,
) -> FakeResult<Json<Vec<CartSummary>>> {
    let backend = state.enter(Route::ListCarts, &headers)?;
    Ok(Json(
        backend
            .carts
            .values()
            .map(|cart| CartSummary {
                id: cart.id,
                name: cart.name.clone(),
            })
            .collect(),
    ))
}

async fn create_cart(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Json(body): Json<CartNameBody>,
) -> FakeResult<Json<Cart>> {
    let mut backend = state.enter(Route::CreateCart, &headers)?;
    backend.next_cart_id += 1;
    let cart = Cart {
        id: CartId::new(backend.next_cart_id),
        name: body.name,
        items: Vec::new(),
    };
    backend.carts.insert(cart.id, cart.clone());
    Ok(Json(cart))
}

async fn rename_cart(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(id): Path<CartId>,
    Json(body): Json<CartNameBody>,
) -> FakeResult<Json<Cart>> {
    let mut backend = state.enter(Route::RenameCart, &headers)?;
    let cart = backend.carts.get_mut(&id).ok_or_else(|| not_found(id))?;
    cart.name = body.name;
    Ok(Json(cart.clone()))
}

async fn delete_cart(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(id): Path<CartId>,
) -> FakeResult<StatusCode> {
    let mut backend = state.enter(Route::DeleteCart, &headers)?;
    backend.carts.remove(&id).ok_or_else(|| not_found(id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_cart(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(id): Path<CartId>,
) -> FakeResult<Json<Cart>> {
    let backend = state.enter(Route::GetCart, &headers)?;
    backend
        .carts
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(id))
}

async fn update_item(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(id): Path<CartId>,
    Json(update): Json<ItemUpdate>,
) -> FakeResult<StatusCode> {
    let mut backend = state.enter(Route::UpdateItem, &headers)?;
    let cart = backend.carts.get_mut(&id).ok_or_else(|| not_found(id))?;

    if let Some(item) = cart
        .items
        .iter_mut()
        .find(|item| item.identity == update.identity)
    {
        item.quantity = update.quantity;
    } else {
        cart.items
            .push(CartItem::new(update.identity.clone(), update.quantity));
    }
    cart.items.retain(|item| item.quantity > 0);

    backend.item_writes.push((id, update));
    Ok(StatusCode::NO_CONTENT)
}

fn not_found(id: CartId) -> FakeError {
    FakeError::NotFound(format!("cart {id}"))
}

// =============================================================================
// Offers
// =============================================================================

async fn offers(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(id): Path<CartId>,
) -> FakeResult<Json<Vec<VendorOfferBreakdown>>> {
    let backend = state.enter(Route::Offers, &headers)?;
    let cart = backend.carts.get(&id).ok_or_else(|| not_found(id))?;
    Ok(Json(price_cart(cart, &backend.quotes)))
}

/// Price every line of `cart` with every vendor's quotes.
///
/// Subtotals are left at zero and over-limit units stay on the purchasable
/// line; the client derives both.
fn price_cart(
    cart: &Cart,
    quotes: &BTreeMap<VendorSlug, HashMap<String, Quote>>,
) -> Vec<VendorOfferBreakdown> {
    let items = cart.merged_items();
    quotes
        .iter()
        .map(|(vendor, table)| {
            let mut purchasable = Vec::new();
            let mut non_purchasable = Vec::new();
            for item in &items {
                let Some(quote) = table.get(&item.identity.card_name) else {
                    non_purchasable.push(OfferLine::unable(item.identity.clone(), item.quantity));
                    continue;
                };
                let buys = quote
                    .max_quantity
                    .map_or(item.quantity, |max| item.quantity.min(max));
                let mut line = OfferLine::purchasable(
                    item.identity.clone(),
                    quote.cash,
                    quote.credit,
                    buys,
                    quote.max_quantity,
                );
                line.unable_to_purchase_quantity = item.quantity - buys;
                let card_name = item.identity.card_name.as_str();
                line.is_best_cash_offer = is_best(quotes, card_name, quote.cash, |q| q.cash);
                line.is_best_credit_offer = is_best(quotes, card_name, quote.credit, |q| q.credit);
                purchasable.push(line);
            }
            VendorOfferBreakdown {
                vendor_slug: vendor.clone(),
                cash_subtotal: Decimal::ZERO,
                credit_subtotal: Decimal::ZERO,
                purchasable_lines: purchasable,
                non_purchasable_lines: non_purchasable,
            }
        })
        .collect()
}

fn is_best(
    quotes: &BTreeMap<VendorSlug, HashMap<String, Quote>>,
    card_name: &str,
    price: Decimal,
    field: impl Fn(&Quote) -> Decimal,
) -> bool {
    quotes
        .values()
        .filter_map(|table| table.get(card_name))
        .all(|other| field(other) <= price)
}

// =============================================================================
// Vendors and submission
// =============================================================================

async fn connected_vendors(
    State(state): State<FakeState>,
    headers: HeaderMap,
) -> FakeResult<Json<Vec<VendorSlug>>> {
    let backend = state.enter(Route::ConnectedVendors, &headers)?;
    Ok(Json(backend.connected.clone()))
}

async fn submit(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Json(request): Json<SubmitRequest>,
) -> FakeResult<Json<SubmitResponse>> {
    // Record before injecting so tests can count attempts that "failed"
    let submission = RecordedSubmission {
        submission_id: headers
            .get("X-Submission-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        cart_id: request.cart_id,
        vendor_slug: request.vendor_slug.clone(),
        payment_method: request.payment_method,
    };
    state.backend().submissions.push(submission);

    let backend = state.enter(Route::Submit, &headers)?;
    let response = backend.rejection.as_ref().map_or_else(
        || SubmitResponse {
            success: true,
            message: format!("Buylist {} received", Uuid::new_v4()),
        },
        |message| SubmitResponse {
            success: false,
            message: message.clone(),
        },
    );
    Ok(Json(response))
}
