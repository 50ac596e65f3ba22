//! Lifecycle events published after a unit of work commits.

use chrono::{DateTime, Utc};
use common::{BookId, BorrowRequestId, ReturnRequestId, UserId};
use serde::{Deserialize, Serialize};

/// Events emitted by the lifecycle engine for the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LendingEvent {
    /// A borrow request was approved and a loan issued.
    BorrowApproved {
        request_id: BorrowRequestId,
        user_id: UserId,
        book_id: BookId,
        due_date: DateTime<Utc>,
    },

    /// A borrow request was rejected.
    BorrowRejected {
        request_id: BorrowRequestId,
        user_id: UserId,
        book_id: BookId,
        remarks: Option<String>,
    },

    /// A return was approved and the copy is back on the shelf.
    ReturnApproved {
        request_id: ReturnRequestId,
        user_id: UserId,
        book_id: BookId,
    },

    /// A return request was rejected; the loan stays active.
    ReturnRejected {
        request_id: ReturnRequestId,
        user_id: UserId,
        book_id: BookId,
        remarks: Option<String>,
    },

    /// A wishlisted book has a copy available for the user.
    BookAvailable { book_id: BookId, user_id: UserId },
}

impl LendingEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            LendingEvent::BorrowApproved { .. } => "BorrowApproved",
            LendingEvent::BorrowRejected { .. } => "BorrowRejected",
            LendingEvent::ReturnApproved { .. } => "ReturnApproved",
            LendingEvent::ReturnRejected { .. } => "ReturnRejected",
            LendingEvent::BookAvailable { .. } => "BookAvailable",
        }
    }

    /// Returns the user the event concerns.
    pub fn user_id(&self) -> UserId {
        match self {
            LendingEvent::BorrowApproved { user_id, .. }
            | LendingEvent::BorrowRejected { user_id, .. }
            | LendingEvent::ReturnApproved { user_id, .. }
            | LendingEvent::ReturnRejected { user_id, .. }
            | LendingEvent::BookAvailable { user_id, .. } => *user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = LendingEvent::BookAvailable {
            book_id: BookId::new(),
            user_id: UserId::new(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BookAvailable");
        assert!(json["data"]["book_id"].is_string());
        assert_eq!(event.event_type(), "BookAvailable");
    }
}
