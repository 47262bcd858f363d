//! Buylist Core - Shared types library.
//!
//! This crate provides the domain types used across the buylist components:
//! - `client` - Session engine (cart store, offers, workflow, submission)
//! - `cli` - Command-line front end driving a session
//! - `integration-tests` - Fake backend and end-to-end tests
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no async. This keeps it lightweight and allows it to be used
//! anywhere, including by a fake backend.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, card identities, carts, offer breakdowns and
//!   workflow enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
