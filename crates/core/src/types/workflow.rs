//! Workflow stage and payment enums.

use serde::{Deserialize, Serialize};

/// Stage of the buylist journey. Exactly one is active per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    #[default]
    ListSelection,
    SearchResults,
    ViewAllOffers,
    FinalSubmission,
}

impl WorkflowStage {
    /// Split-pane projection of this stage.
    #[must_use]
    pub const fn sub_stage(self) -> SubStage {
        match self {
            Self::ListSelection => SubStage::CartListSelection,
            Self::SearchResults => SubStage::CartEdit,
            Self::ViewAllOffers => SubStage::CartEditWithOffers,
            Self::FinalSubmission => SubStage::SubmitOffer,
        }
    }

    /// Whether this stage requires an active cart.
    #[must_use]
    pub const fn requires_cart(self) -> bool {
        matches!(self, Self::ViewAllOffers | Self::FinalSubmission)
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ListSelection => write!(f, "list_selection"),
            Self::SearchResults => write!(f, "search_results"),
            Self::ViewAllOffers => write!(f, "view_all_offers"),
            Self::FinalSubmission => write!(f, "final_submission"),
        }
    }
}

/// Finer-grained layout projection used by split-pane views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStage {
    CartListSelection,
    CartEditWithOffers,
    CartEdit,
    SubmitOffer,
}

/// How the vendor pays for a submitted buylist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    StoreCredit,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cash => write!(f, "cash"),
            Self::StoreCredit => write!(f, "store_credit"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "store_credit" | "store-credit" | "credit" => Ok(Self::StoreCredit),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_stage_projection() {
        assert_eq!(
            WorkflowStage::ListSelection.sub_stage(),
            SubStage::CartListSelection
        );
        assert_eq!(WorkflowStage::SearchResults.sub_stage(), SubStage::CartEdit);
        assert_eq!(
            WorkflowStage::ViewAllOffers.sub_stage(),
            SubStage::CartEditWithOffers
        );
        assert_eq!(
            WorkflowStage::FinalSubmission.sub_stage(),
            SubStage::SubmitOffer
        );
    }

    #[test]
    fn test_payment_method_wire_values() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::StoreCredit).unwrap(),
            "\"store_credit\""
        );
        assert_eq!("cash".parse::<PaymentMethod>(), Ok(PaymentMethod::Cash));
        assert_eq!(
            "store-credit".parse::<PaymentMethod>(),
            Ok(PaymentMethod::StoreCredit)
        );
        assert!("check".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_stages_requiring_cart() {
        assert!(!WorkflowStage::ListSelection.requires_cart());
        assert!(!WorkflowStage::SearchResults.requires_cart());
        assert!(WorkflowStage::ViewAllOffers.requires_cart());
        assert!(WorkflowStage::FinalSubmission.requires_cart());
    }
}
