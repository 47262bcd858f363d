//! Workflow state machine of the buylist journey.
//!
//! ```text
//! ListSelection --SelectCart--> SearchResults --ViewOffers--> ViewAllOffers
//!                                     ^                          |     ^
//!                       Search (any)  |              ChooseVendor|     |SubmissionSucceeded
//!                                     |                          v     |
//!                                     +------------------- FinalSubmission
//! ```
//!
//! Transitions are pure: [`WorkflowState::transition`] maps a state, an
//! event and a snapshot of the data preconditions to the next state plus
//! the effects the caller must run. An event whose preconditions do not
//! hold is ignored.

use std::collections::{BTreeSet, HashSet};

use buylist_core::{CartId, SubStage, VendorSlug, WorkflowStage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Something the user (or a completed operation) did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// A cart was selected or created.
    SelectCart(CartId),
    /// "View offers" was pressed.
    ViewOffers,
    /// A vendor was chosen for review.
    ChooseVendor(VendorSlug),
    /// A search or autocomplete suggestion was picked.
    Search(String),
    SubmissionSucceeded,
    SubmissionFailed,
    ReturnToCartList,
    /// The active cart or its offers changed; re-check the selection.
    Revalidate,
}

/// Side effect requested by a transition. The machine performs none itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEffect {
    ResetFilters,
    RunSearch(String),
    RefreshOffers,
}

/// Data the transitions are gated on, captured by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub active_cart: Option<CartId>,
    /// Whether the active cart has a line with a positive quantity.
    pub has_items: bool,
    /// Vendors in the most recent, non-stale offer fetch for the active cart.
    pub offered_vendors: HashSet<VendorSlug>,
}

/// Session-scoped workflow state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub stage: WorkflowStage,
    /// Cart the stage refers to.
    pub cart_id: Option<CartId>,
    /// Only set in `FinalSubmission`.
    pub selected_vendor: Option<VendorSlug>,
    pub filters: BTreeSet<String>,
    pub search_query: Option<String>,
}

/// Result of a legal transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub state: WorkflowState,
    pub effects: Vec<WorkflowEffect>,
}

impl WorkflowState {
    #[must_use]
    pub const fn sub_stage(&self) -> SubStage {
        self.stage.sub_stage()
    }

    /// The state `event` leads to, or `None` if the event is not legal here.
    #[must_use]
    pub fn transition(&self, event: &WorkflowEvent, pre: &Preconditions) -> Option<Step> {
        use WorkflowStage::{FinalSubmission, ListSelection, SearchResults, ViewAllOffers};

        let mut next = self.clone();
        let mut effects = Vec::new();

        match (self.stage, event) {
            (ListSelection, WorkflowEvent::SelectCart(cart_id)) => {
                if pre.active_cart != Some(*cart_id) {
                    return None;
                }
                next.stage = SearchResults;
                next.cart_id = Some(*cart_id);
                next.selected_vendor = None;
            }
            (SearchResults, WorkflowEvent::ViewOffers) => {
                if !self.cart_is_active(pre) || !pre.has_items {
                    return None;
                }
                next.stage = ViewAllOffers;
                effects.push(WorkflowEffect::RefreshOffers);
            }
            (ViewAllOffers, WorkflowEvent::ChooseVendor(slug)) => {
                if !self.cart_is_active(pre) || !pre.offered_vendors.contains(slug) {
                    return None;
                }
                next.stage = FinalSubmission;
                next.selected_vendor = Some(slug.clone());
            }
            (_, WorkflowEvent::Search(query)) => {
                next.stage = SearchResults;
                next.selected_vendor = None;
                next.filters.clear();
                next.search_query = Some(query.clone());
                effects.push(WorkflowEffect::ResetFilters);
                effects.push(WorkflowEffect::RunSearch(query.clone()));
            }
            (FinalSubmission, WorkflowEvent::SubmissionSucceeded) => {
                next.stage = ViewAllOffers;
                next.selected_vendor = None;
            }
            // A failed submission keeps the user on the review screen
            (FinalSubmission, WorkflowEvent::SubmissionFailed) => {}
            (_, WorkflowEvent::ReturnToCartList) => {
                next.stage = ListSelection;
                next.selected_vendor = None;
            }
            (_, WorkflowEvent::Revalidate) => {
                if self.cart_id != pre.active_cart {
                    next.cart_id = pre.active_cart;
                    next.selected_vendor = None;
                    if self.stage.requires_cart() {
                        next.stage = if pre.active_cart.is_some() {
                            ViewAllOffers
                        } else {
                            ListSelection
                        };
                    }
                    if next.stage == ViewAllOffers {
                        effects.push(WorkflowEffect::RefreshOffers);
                    }
                } else if self.stage == FinalSubmission
                    && self
                        .selected_vendor
                        .as_ref()
                        .is_none_or(|slug| !pre.offered_vendors.contains(slug))
                {
                    next.stage = ViewAllOffers;
                    next.selected_vendor = None;
                }
            }
            _ => return None,
        }

        Some(Step {
            state: next,
            effects,
        })
    }

    fn cart_is_active(&self, pre: &Preconditions) -> bool {
        self.cart_id.is_some() && self.cart_id == pre.active_cart
    }
}

/// Owner of the session's [`WorkflowState`].
#[derive(Debug, Default)]
pub struct WorkflowMachine {
    state: WorkflowState,
}

impl WorkflowMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> &WorkflowState {
        &self.state
    }

    #[must_use]
    pub const fn stage(&self) -> WorkflowStage {
        self.state.stage
    }

    #[must_use]
    pub const fn selected_vendor(&self) -> Option<&VendorSlug> {
        self.state.selected_vendor.as_ref()
    }

    /// Apply `event`, returning the effects to run. Illegal events leave
    /// the state untouched and return no effects.
    pub fn apply(&mut self, event: &WorkflowEvent, pre: &Preconditions) -> Vec<WorkflowEffect> {
        let Some(step) = self.state.transition(event, pre) else {
            debug!(stage = %self.state.stage, ?event, "Ignoring workflow event");
            return Vec::new();
        };
        if step.state.stage != self.state.stage {
            debug!(from = %self.state.stage, to = %step.state.stage, ?event, "Workflow transition");
        }
        self.state = step.state;
        step.effects
    }

    /// Add an active search filter.
    pub fn add_filter(&mut self, filter: impl Into<String>) {
        self.state.filters.insert(filter.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart() -> CartId {
        CartId::new(1)
    }

    fn ready(vendors: &[&str]) -> Preconditions {
        Preconditions {
            active_cart: Some(cart()),
            has_items: true,
            offered_vendors: vendors.iter().map(|v| VendorSlug::new(*v)).collect(),
        }
    }

    fn machine_at(stage: WorkflowStage) -> WorkflowMachine {
        let pre = ready(&["vendor-a"]);
        let mut machine = WorkflowMachine::new();
        let path = [
            WorkflowEvent::SelectCart(cart()),
            WorkflowEvent::ViewOffers,
            WorkflowEvent::ChooseVendor(VendorSlug::new("vendor-a")),
        ];
        for event in &path {
            if machine.stage() == stage {
                break;
            }
            machine.apply(event, &pre);
        }
        assert_eq!(machine.stage(), stage);
        machine
    }

    #[test]
    fn test_happy_path() {
        let machine = machine_at(WorkflowStage::FinalSubmission);
        assert_eq!(machine.selected_vendor(), Some(&VendorSlug::new("vendor-a")));
        assert_eq!(machine.state().sub_stage(), SubStage::SubmitOffer);
    }

    #[test]
    fn test_select_cart_requires_cart_id() {
        let mut machine = WorkflowMachine::new();
        let effects = machine.apply(&WorkflowEvent::SelectCart(cart()), &Preconditions::default());
        assert!(effects.is_empty());
        assert_eq!(machine.stage(), WorkflowStage::ListSelection);
    }

    #[test]
    fn test_view_offers_requires_items() {
        let mut machine = machine_at(WorkflowStage::SearchResults);
        let empty = Preconditions {
            has_items: false,
            ..ready(&[])
        };
        assert!(machine.apply(&WorkflowEvent::ViewOffers, &empty).is_empty());
        assert_eq!(machine.stage(), WorkflowStage::SearchResults);

        let effects = machine.apply(&WorkflowEvent::ViewOffers, &ready(&[]));
        assert_eq!(effects, vec![WorkflowEffect::RefreshOffers]);
        assert_eq!(machine.stage(), WorkflowStage::ViewAllOffers);
    }

    #[test]
    fn test_offer_stages_require_cart() {
        let mut machine = machine_at(WorkflowStage::SearchResults);
        let no_cart = Preconditions {
            active_cart: None,
            ..ready(&["vendor-a"])
        };
        machine.apply(&WorkflowEvent::ViewOffers, &no_cart);
        assert_eq!(machine.stage(), WorkflowStage::SearchResults);
    }

    #[test]
    fn test_choose_vendor_must_be_offered() {
        let mut machine = machine_at(WorkflowStage::ViewAllOffers);
        machine.apply(
            &WorkflowEvent::ChooseVendor(VendorSlug::new("vendor-z")),
            &ready(&["vendor-a"]),
        );
        assert_eq!(machine.stage(), WorkflowStage::ViewAllOffers);
        assert_eq!(machine.selected_vendor(), None);
    }

    #[test]
    fn test_search_from_any_stage_resets_filters() {
        for stage in [
            WorkflowStage::ListSelection,
            WorkflowStage::SearchResults,
            WorkflowStage::ViewAllOffers,
            WorkflowStage::FinalSubmission,
        ] {
            let mut machine = machine_at(stage);
            machine.add_filter("foil-only");

            let effects = machine.apply(&WorkflowEvent::Search("Forest".into()), &ready(&[]));
            assert_eq!(
                effects,
                vec![
                    WorkflowEffect::ResetFilters,
                    WorkflowEffect::RunSearch("Forest".into())
                ]
            );
            assert_eq!(machine.stage(), WorkflowStage::SearchResults);
            assert!(machine.state().filters.is_empty());
            assert_eq!(machine.selected_vendor(), None);
            assert_eq!(machine.state().search_query.as_deref(), Some("Forest"));
        }
    }

    #[test]
    fn test_submission_outcomes() {
        let mut machine = machine_at(WorkflowStage::FinalSubmission);
        machine.apply(&WorkflowEvent::SubmissionFailed, &ready(&["vendor-a"]));
        assert_eq!(machine.stage(), WorkflowStage::FinalSubmission);
        assert!(machine.selected_vendor().is_some());

        machine.apply(&WorkflowEvent::SubmissionSucceeded, &ready(&["vendor-a"]));
        assert_eq!(machine.stage(), WorkflowStage::ViewAllOffers);
        assert_eq!(machine.selected_vendor(), None);
    }

    #[test]
    fn test_submission_events_outside_review_are_ignored() {
        let mut machine = machine_at(WorkflowStage::SearchResults);
        machine.apply(&WorkflowEvent::SubmissionSucceeded, &ready(&[]));
        assert_eq!(machine.stage(), WorkflowStage::SearchResults);
    }

    #[test]
    fn test_return_to_cart_list() {
        let mut machine = machine_at(WorkflowStage::FinalSubmission);
        machine.apply(&WorkflowEvent::ReturnToCartList, &ready(&[]));
        assert_eq!(machine.stage(), WorkflowStage::ListSelection);
        assert_eq!(machine.selected_vendor(), None);
    }

    #[test]
    fn test_missing_vendor_invalidates_selection() {
        let mut machine = machine_at(WorkflowStage::FinalSubmission);
        machine.apply(&WorkflowEvent::Revalidate, &ready(&["vendor-b"]));
        assert_eq!(machine.stage(), WorkflowStage::ViewAllOffers);
        assert_eq!(machine.selected_vendor(), None);
    }

    #[test]
    fn test_cart_change_invalidates_selection() {
        let mut machine = machine_at(WorkflowStage::FinalSubmission);
        let other = Preconditions {
            active_cart: Some(CartId::new(2)),
            ..ready(&["vendor-a"])
        };
        let effects = machine.apply(&WorkflowEvent::Revalidate, &other);
        assert_eq!(effects, vec![WorkflowEffect::RefreshOffers]);
        assert_eq!(machine.stage(), WorkflowStage::ViewAllOffers);
        assert_eq!(machine.state().cart_id, Some(CartId::new(2)));
        assert_eq!(machine.selected_vendor(), None);

        machine.apply(&WorkflowEvent::Revalidate, &Preconditions::default());
        assert_eq!(machine.stage(), WorkflowStage::ListSelection);
    }

    #[test]
    fn test_transition_is_pure() {
        let state = WorkflowState::default();
        let pre = ready(&[]);
        let a = state.transition(&WorkflowEvent::SelectCart(cart()), &pre);
        let b = state.transition(&WorkflowEvent::SelectCart(cart()), &pre);
        assert_eq!(a, b);
        assert_eq!(state, WorkflowState::default());
    }
}
