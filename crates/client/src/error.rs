//! Unified error type for the buylist session.

use buylist_core::CartNameError;
use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::offers::OfferError;
use crate::persist::PersistError;
use crate::store::StoreError;
use crate::submission::SubmissionError;
use crate::vendors::VendorDirectoryError;

/// Any error a [`BuylistSession`](crate::BuylistSession) operation can return.
#[derive(Debug, Error)]
pub enum BuylistError {
    /// Backend request failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Local cart edit rejected.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Cart name rejected.
    #[error("Invalid cart name: {0}")]
    CartName(#[from] CartNameError),

    /// Line write failed.
    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Offer(#[from] OfferError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vendor directory error: {0}")]
    Vendors(#[from] VendorDirectoryError),
}

impl BuylistError {
    /// Whether the same operation may succeed if the user tries again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_transient(),
            Self::Persist(e) => e.is_retryable(),
            Self::Offer(e) => e.is_retryable(),
            Self::Submission(e) => matches!(
                e,
                SubmissionError::Ambiguous { .. } | SubmissionError::ConnectionCheck(_)
            ),
            Self::Store(_) | Self::CartName(_) | Self::Config(_) | Self::Vendors(_) => false,
        }
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, BuylistError>;
