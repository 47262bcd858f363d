//! Submission coordinator: validates and sends a buylist to one vendor.
//!
//! Submitting is not idempotent. The coordinator checks every precondition
//! it can before the request, sends it at most once, and never retries; a
//! failure whose outcome is unknown is reported as
//! [`SubmissionError::Ambiguous`] so the user decides whether to try again.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use buylist_core::{CartId, PaymentMethod, VendorSlug};
use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::backend::{BackendError, BuylistBackend, SubmitRequest, SubmitResponse};

const CONNECTED_KEY: &str = "connected-vendors";

/// Why a submission was not (or may not have been) accepted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Accept the terms and cancellation rights before submitting")]
    TermsNotAccepted,

    #[error("Choose cash or store credit before submitting")]
    NoPaymentMethod,

    #[error("Choose a vendor offer to submit")]
    NoVendorSelected,

    /// The user has no linked account with this vendor.
    #[error("Your account is not linked with {0}")]
    VendorNotConnected(VendorSlug),

    #[error("A submission is already in progress")]
    InFlight,

    /// The vendor declined the offer; the message is theirs.
    #[error("{0}")]
    Rejected(String),

    /// No answer came back; the vendor may have received the offer.
    #[error("Submission {submission_id} may not have completed: {message}")]
    Ambiguous { submission_id: Uuid, message: String },

    #[error("Could not check vendor connections: {0}")]
    ConnectionCheck(String),

    #[error("Submission failed: {0}")]
    Backend(String),
}

/// What the user asked to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub cart_id: CartId,
    pub vendor: VendorSlug,
    pub payment_method: Option<PaymentMethod>,
    /// Terms and cancellation-rights acknowledgement.
    pub terms_accepted: bool,
}

impl SubmissionRequest {
    /// The checks that need no network: terms first, then payment method.
    ///
    /// # Errors
    ///
    /// Returns `TermsNotAccepted` or `NoPaymentMethod`.
    pub fn validate(&self) -> Result<PaymentMethod, SubmissionError> {
        if !self.terms_accepted {
            return Err(SubmissionError::TermsNotAccepted);
        }
        match self.payment_method {
            Some(method) => Ok(method),
            None => Err(SubmissionError::NoPaymentMethod),
        }
    }
}

/// Sends buylists, at most one at a time.
pub struct SubmissionCoordinator {
    backend: Arc<dyn BuylistBackend>,
    connected: Cache<&'static str, Arc<HashSet<VendorSlug>>>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the submission ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SubmissionCoordinator {
    /// Create a coordinator trusting the connected-vendor list for
    /// `connected_ttl`.
    #[must_use]
    pub fn new(backend: Arc<dyn BuylistBackend>, connected_ttl: Duration) -> Self {
        let connected = Cache::builder()
            .max_capacity(1)
            .time_to_live(connected_ttl)
            .build();

        Self {
            backend,
            connected,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a submission is in progress.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Vendors the user has linked accounts with.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the list is not cached and cannot be
    /// fetched.
    pub async fn connected_vendors(&self) -> Result<Arc<HashSet<VendorSlug>>, BackendError> {
        if let Some(vendors) = self.connected.get(CONNECTED_KEY).await {
            debug!("Cache hit for connected vendors");
            return Ok(vendors);
        }

        let vendors: Arc<HashSet<VendorSlug>> =
            Arc::new(self.backend.connected_vendors().await?.into_iter().collect());
        self.connected
            .insert(CONNECTED_KEY, Arc::clone(&vendors))
            .await;
        Ok(vendors)
    }

    /// Forget the cached connected-vendor list.
    pub fn invalidate_connections(&self) {
        self.connected.invalidate_all();
    }

    /// Validate and send a buylist.
    ///
    /// Checks, in order: terms accepted, payment method chosen, no other
    /// submission in progress, vendor connected. Only then is the request
    /// sent, exactly once.
    ///
    /// # Errors
    ///
    /// Returns the first failed precondition, `Rejected` if the vendor
    /// declined, `Ambiguous` if the outcome is unknown, or `Backend` for
    /// other failures.
    #[instrument(
        skip(self, request),
        fields(cart_id = %request.cart_id, vendor = %request.vendor)
    )]
    pub async fn submit(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmitResponse, SubmissionError> {
        let payment_method = request.validate()?;

        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(SubmissionError::InFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let connected = self
            .connected_vendors()
            .await
            .map_err(|e| SubmissionError::ConnectionCheck(e.to_string()))?;
        if !connected.contains(&request.vendor) {
            return Err(SubmissionError::VendorNotConnected(request.vendor.clone()));
        }

        let submit = SubmitRequest {
            cart_id: request.cart_id,
            vendor_slug: request.vendor.clone(),
            payment_method,
            submission_id: Uuid::new_v4(),
        };
        info!(
            submission_id = %submit.submission_id,
            payment_method = %payment_method,
            "Submitting buylist"
        );

        match self.backend.submit_buylist(&submit).await {
            Ok(response) if response.success => {
                info!(submission_id = %submit.submission_id, "Buylist accepted");
                Ok(response)
            }
            Ok(response) => {
                warn!(
                    submission_id = %submit.submission_id,
                    message = %response.message,
                    "Buylist rejected by vendor"
                );
                Err(SubmissionError::Rejected(response.message))
            }
            Err(BackendError::Unauthorized(message)) => {
                warn!(submission_id = %submit.submission_id, %message, "Vendor link rejected");
                self.invalidate_connections();
                Err(SubmissionError::VendorNotConnected(request.vendor.clone()))
            }
            Err(e) if e.is_ambiguous() || matches!(e, BackendError::Parse(_)) => {
                tracing::error!(
                    submission_id = %submit.submission_id,
                    error = %e,
                    "Buylist submission outcome unknown"
                );
                Err(SubmissionError::Ambiguous {
                    submission_id: submit.submission_id,
                    message: e.to_string(),
                })
            }
            Err(e) => {
                tracing::error!(
                    submission_id = %submit.submission_id,
                    error = %e,
                    "Buylist submission failed"
                );
                Err(SubmissionError::Backend(e.to_string()))
            }
        }
    }
}
