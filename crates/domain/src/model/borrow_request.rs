//! Borrow requests opened by students and decided by staff.

use chrono::{DateTime, Utc};
use common::{BookId, BorrowRequestId, UserId};
use serde::{Deserialize, Serialize};

use super::status::BorrowStatus;
use crate::error::LendingError;

/// A request to borrow one copy of a book.
///
/// Created `Pending` and mutated exactly once by a librarian or admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequest {
    pub id: BorrowRequestId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub requested_at: DateTime<Utc>,
    pub status: BorrowStatus,
    /// Set on approval.
    pub due_date: Option<DateTime<Utc>>,
    pub approver_id: Option<UserId>,
    /// Time of the decision, whichever way it went.
    pub decided_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

impl BorrowRequest {
    /// Opens a pending request.
    pub fn open(user_id: UserId, book_id: BookId, requested_at: DateTime<Utc>) -> Self {
        Self {
            id: BorrowRequestId::new(),
            user_id,
            book_id,
            requested_at,
            status: BorrowStatus::Pending,
            due_date: None,
            approver_id: None,
            decided_at: None,
            remarks: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == BorrowStatus::Pending
    }

    /// Marks the request approved with the given due date.
    pub fn approve(
        &mut self,
        approver_id: UserId,
        at: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> Result<(), LendingError> {
        self.status = self.status.approve().ok_or_else(|| self.invalid("approve"))?;
        self.approver_id = Some(approver_id);
        self.decided_at = Some(at);
        self.due_date = Some(due_date);
        Ok(())
    }

    /// Marks the request rejected.
    pub fn reject(
        &mut self,
        approver_id: UserId,
        at: DateTime<Utc>,
        remarks: Option<String>,
    ) -> Result<(), LendingError> {
        self.status = self.status.reject().ok_or_else(|| self.invalid("reject"))?;
        self.approver_id = Some(approver_id);
        self.decided_at = Some(at);
        self.remarks = remarks;
        Ok(())
    }

    /// Fails with `InvalidState` unless the request is still pending.
    pub fn ensure_pending(&self, action: &'static str) -> Result<(), LendingError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> LendingError {
        LendingError::InvalidState {
            entity: "BorrowRequest",
            id: self.id.to_string(),
            status: self.status.to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Duration;

    #[test]
    fn approve_sets_decision_fields() {
        let now = Utc::now();
        let mut request = BorrowRequest::open(UserId::new(), BookId::new(), now);
        let approver = UserId::new();

        request
            .approve(approver, now, now + Duration::days(14))
            .unwrap();

        assert_eq!(request.status, BorrowStatus::Approved);
        assert_eq!(request.approver_id, Some(approver));
        assert_eq!(request.due_date, Some(now + Duration::days(14)));
    }

    #[test]
    fn second_decision_is_invalid_state() {
        let now = Utc::now();
        let mut request = BorrowRequest::open(UserId::new(), BookId::new(), now);
        request
            .reject(UserId::new(), now, Some("damaged".into()))
            .unwrap();

        let err = request.approve(UserId::new(), now, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(request.status, BorrowStatus::Rejected);
        assert_eq!(request.due_date, None);
        assert_eq!(request.remarks.as_deref(), Some("damaged"));
    }
}
