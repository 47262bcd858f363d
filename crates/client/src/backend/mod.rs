//! Cart, offer, vendor-connection and submission backend clients.
//!
//! # Architecture
//!
//! - [`BuylistBackend`] is the seam every component talks through; the
//!   session never touches HTTP directly
//! - [`HttpBackend`] implements it over `reqwest` against the REST API
//! - The backend is the source of truth for carts and prices - the client
//!   only keeps optimistic local state on top of it
//!
//! # Endpoints
//!
//! | operation | request |
//! |-----------|---------|
//! | list carts | `GET /carts` |
//! | create cart | `POST /carts {name}` |
//! | rename cart | `PATCH /carts/{id} {name}` |
//! | delete cart | `DELETE /carts/{id}` |
//! | fetch cart | `GET /carts/{id}` |
//! | set line quantity | `PATCH /carts/{id}/items {identity, quantity}` |
//! | offers | `GET /carts/{id}/offers` |
//! | connected vendors | `GET /connected-vendors` |
//! | submit | `POST /buylists/submit {cartId, vendorSlug, paymentMethod}` |

mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use buylist_core::{
    CardIdentity, Cart, CartId, CartName, CartSummary, PaymentMethod, VendorOfferBreakdown,
    VendorSlug,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when talking to the buylist backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP transport failed (connect, timeout, reset).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials rejected or missing.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, 5xx and 429 are transient; every other status is
    /// an answer the backend will give again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::Unauthorized(_) | Self::Parse(_) | Self::Url(_) => false,
        }
    }

    /// Whether a non-idempotent request may have reached the backend even
    /// though no answer came back.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder() && !e.is_connect(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Body of `PATCH /carts/{id}/items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub identity: CardIdentity,
    pub quantity: u32,
}

/// Body of `POST /carts` and `PATCH /carts/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartNameBody {
    pub name: CartName,
}

/// Body of `POST /buylists/submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub cart_id: CartId,
    pub vendor_slug: VendorSlug,
    pub payment_method: PaymentMethod,
    /// Client-side correlation id, sent as the `X-Submission-Id` header.
    #[serde(skip)]
    pub submission_id: Uuid,
}

/// Answer of `POST /buylists/submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// The four collaborator surfaces the buylist session consumes.
#[async_trait]
pub trait BuylistBackend: Send + Sync {
    /// List the user's carts.
    async fn list_carts(&self) -> Result<Vec<CartSummary>, BackendError>;

    /// Create an empty cart.
    async fn create_cart(&self, name: &CartName) -> Result<Cart, BackendError>;

    /// Rename a cart.
    async fn rename_cart(&self, cart_id: CartId, name: &CartName) -> Result<Cart, BackendError>;

    /// Delete a cart, releasing its id.
    async fn delete_cart(&self, cart_id: CartId) -> Result<(), BackendError>;

    /// Fetch a cart with its items.
    async fn get_cart(&self, cart_id: CartId) -> Result<Cart, BackendError>;

    /// Set the persisted quantity of one line. Quantity 0 removes the line.
    async fn update_item(&self, cart_id: CartId, update: &ItemUpdate) -> Result<(), BackendError>;

    /// Per-vendor offer breakdowns for a cart, as computed by the pricing
    /// backend.
    async fn get_offers(&self, cart_id: CartId) -> Result<Vec<VendorOfferBreakdown>, BackendError>;

    /// Vendors the user has authorized for submission.
    async fn connected_vendors(&self) -> Result<Vec<VendorSlug>, BackendError>;

    /// Submit a cart to a vendor. Not idempotent.
    async fn submit_buylist(&self, request: &SubmitRequest)
    -> Result<SubmitResponse, BackendError>;
}
