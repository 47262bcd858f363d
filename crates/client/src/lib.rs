//! Buylist client library.
//!
//! The session engine behind the buylist workflow: a user fills a cart with
//! cards, compares what several vendors offer for it, and submits it to one
//! of them.
//!
//! # Components
//!
//! - [`backend`] - Typed gateway to the cart, offer, vendor-connection and
//!   submission endpoints
//! - [`store`] - Optimistic line items of the active cart
//! - [`persist`] - Debounced, ordered line writes
//! - [`offers`] - Per-vendor offer cache with stale-response discarding
//! - [`workflow`] - Pure state machine of the journey's stages
//! - [`submission`] - Validated, at-most-once submission
//! - [`session`] - The controller wiring them together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod notices;
pub mod offers;
pub mod persist;
pub mod session;
pub mod store;
pub mod submission;
pub mod vendors;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use backend::{BackendError, BuylistBackend, HttpBackend, SubmitResponse};
pub use config::{BackendConfig, ClientConfig, ConfigError, PersistConfig};
pub use error::{BuylistError, Result};
pub use notices::{Notice, NoticeAction, NoticeBoard, NoticeKind};
pub use offers::{OfferAssembler, OfferError, OfferSnapshot};
pub use persist::{PersistError, PersistOutcome, PersistTicket, PersistenceGateway};
pub use session::BuylistSession;
pub use store::{CartStore, QuantityChange, StoreError};
pub use submission::{SubmissionCoordinator, SubmissionError, SubmissionRequest};
pub use vendors::{VendorDirectory, VendorInfo};
pub use workflow::{WorkflowEffect, WorkflowEvent, WorkflowMachine, WorkflowState};
