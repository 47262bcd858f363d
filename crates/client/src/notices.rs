//! User-facing notices for failures that happen off the request path.
//!
//! Background work (line writes, offer refreshes) never returns its errors
//! to a caller; it posts a [`Notice`] instead. Notices stay on the board
//! until dismissed or acted upon.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use buylist_core::{CardIdentity, CartId, VendorSlug};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::offers::OfferError;
use crate::persist::PersistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Error,
    Warning,
    Info,
}

/// Something the user can do about a notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NoticeAction {
    /// Write the current local quantity again.
    RetryPersist {
        cart_id: CartId,
        identity: CardIdentity,
    },
    /// Put the line back to what it was before the failed edit.
    RestoreQuantity {
        cart_id: CartId,
        identity: CardIdentity,
        quantity: u32,
    },
    RetryRefresh { cart_id: CartId },
    /// Connect the user's account with the vendor, then submit again.
    LinkAccount { vendor: VendorSlug },
    RetrySubmit { vendor: VendorSlug },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: Uuid,
    pub kind: NoticeKind,
    pub message: String,
    pub actions: Vec<NoticeAction>,
    pub created_at: DateTime<Utc>,
    /// A newer notice with the same key replaces this one.
    #[serde(skip)]
    key: Option<String>,
}

impl Notice {
    #[must_use]
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            actions: Vec::new(),
            created_at: Utc::now(),
            key: None,
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: NoticeAction) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    fn keyed(mut self, key: String) -> Self {
        self.key = Some(key);
        self
    }

    /// A line write failed; offers to retry it or restore `previous`.
    #[must_use]
    pub fn persist_failed(
        err: &PersistError,
        cart_id: CartId,
        identity: &CardIdentity,
        previous: u32,
    ) -> Self {
        let mut notice = Self::new(NoticeKind::Error, err.to_string());
        if err.is_retryable() {
            notice = notice.with_action(NoticeAction::RetryPersist {
                cart_id,
                identity: identity.clone(),
            });
        }
        notice
            .with_action(NoticeAction::RestoreQuantity {
                cart_id,
                identity: identity.clone(),
                quantity: previous,
            })
            .keyed(format!("persist:{cart_id}:{identity}"))
    }

    #[must_use]
    pub fn refresh_failed(err: &OfferError, cart_id: CartId) -> Self {
        let notice = Self::new(NoticeKind::Warning, err.to_string());
        let notice = if err.is_retryable() {
            notice.with_action(NoticeAction::RetryRefresh { cart_id })
        } else {
            notice
        };
        notice.keyed(format!("refresh:{cart_id}"))
    }

    #[must_use]
    pub fn link_account(vendor: &VendorSlug, vendor_name: &str) -> Self {
        Self::new(
            NoticeKind::Error,
            format!("Link your {vendor_name} account to submit this buylist"),
        )
        .with_action(NoticeAction::LinkAccount {
            vendor: vendor.clone(),
        })
        .keyed(format!("link:{vendor}"))
    }

    /// The submission may or may not have reached the vendor.
    #[must_use]
    pub fn submission_uncertain(vendor: &VendorSlug, message: &str) -> Self {
        Self::new(
            NoticeKind::Warning,
            format!("{message}. Check with the vendor before submitting again"),
        )
        .with_action(NoticeAction::RetrySubmit {
            vendor: vendor.clone(),
        })
        .keyed(format!("submit:{vendor}"))
    }
}

/// Ordered collection of open notices. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct NoticeBoard {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl NoticeBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn notices(&self) -> MutexGuard<'_, Vec<Notice>> {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Post a notice, replacing an open one with the same key.
    pub fn post(&self, notice: Notice) -> Uuid {
        match notice.kind {
            NoticeKind::Error | NoticeKind::Warning => {
                warn!(notice_id = %notice.id, message = %notice.message, "Notice posted");
            }
            NoticeKind::Info => {
                info!(notice_id = %notice.id, message = %notice.message, "Notice posted");
            }
        }
        let id = notice.id;
        let mut notices = self.notices();
        if let Some(key) = &notice.key {
            notices.retain(|n| n.key.as_ref() != Some(key));
        }
        notices.push(notice);
        id
    }

    /// Open notices, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<Notice> {
        self.notices().clone()
    }

    /// Remove a notice. Returns whether it was open.
    pub fn dismiss(&self, id: Uuid) -> bool {
        self.take(id).is_some()
    }

    /// Remove and return a notice, e.g. to run one of its actions.
    pub fn take(&self, id: Uuid) -> Option<Notice> {
        let mut notices = self.notices();
        let index = notices.iter().position(|n| n.id == id)?;
        Some(notices.remove(index))
    }

    /// Remove notices about one line, e.g. after it was written.
    pub fn resolve_line(&self, cart_id: CartId, identity: &CardIdentity) {
        let key = format!("persist:{cart_id}:{identity}");
        self.notices().retain(|n| n.key.as_deref() != Some(key.as_str()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notices().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notices().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn forest() -> CardIdentity {
        CardIdentity::new("MTG", "Forest", "Alpha", "Common", "Near Mint", false)
    }

    fn write_failure(transient: bool) -> PersistError {
        PersistError::Failed {
            cart_id: CartId::new(1),
            identity: forest(),
            quantity: 4,
            message: "API error: 503 - service unavailable".to_string(),
            transient,
        }
    }

    #[test]
    fn test_persist_notice_actions() {
        let notice = Notice::persist_failed(&write_failure(true), CartId::new(1), &forest(), 2);
        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(
            notice.actions,
            vec![
                NoticeAction::RetryPersist {
                    cart_id: CartId::new(1),
                    identity: forest()
                },
                NoticeAction::RestoreQuantity {
                    cart_id: CartId::new(1),
                    identity: forest(),
                    quantity: 2
                },
            ]
        );

        let terminal = Notice::persist_failed(&write_failure(false), CartId::new(1), &forest(), 2);
        assert_eq!(terminal.actions.len(), 1);
    }

    #[test]
    fn test_same_key_replaces() {
        let board = NoticeBoard::new();
        board.post(Notice::persist_failed(&write_failure(true), CartId::new(1), &forest(), 2));
        let newest = board.post(Notice::persist_failed(
            &write_failure(true),
            CartId::new(1),
            &forest(),
            3,
        ));
        board.post(Notice::new(NoticeKind::Info, "Offer received"));

        let notices = board.list();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].id, newest);
    }

    #[test]
    fn test_dismiss_and_take() {
        let board = NoticeBoard::new();
        let id = board.post(Notice::link_account(&VendorSlug::new("vendor-a"), "Vendor A"));
        assert!(board.take(id).is_some());
        assert!(!board.dismiss(id));
        assert!(board.is_empty());
    }

    #[test]
    fn test_resolve_line() {
        let board = NoticeBoard::new();
        board.post(Notice::persist_failed(&write_failure(true), CartId::new(1), &forest(), 2));
        board.post(Notice::refresh_failed(
            &OfferError::Fetch {
                message: "timeout".into(),
                transient: true,
            },
            CartId::new(1),
        ));

        board.resolve_line(CartId::new(1), &forest());
        assert_eq!(board.len(), 1);
        assert!(matches!(
            board.list()[0].actions[0],
            NoticeAction::RetryRefresh { .. }
        ));
    }
}
