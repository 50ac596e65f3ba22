//! Issued loans.

use chrono::{DateTime, Utc};
use common::{BookId, BorrowRequestId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use super::borrow_request::BorrowRequest;
use crate::error::LendingError;

/// Note recorded on every loan issued by an approval.
pub const ISSUED_ON_APPROVAL: &str = "Book issued upon approval";

/// One issued loan. Active while `returned_at` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowTransaction {
    pub id: TransactionId,
    pub borrow_request_id: BorrowRequestId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    /// Always 0; no penalty is computed.
    pub penalty_cents: i64,
    pub notes: Option<String>,
}

impl BorrowTransaction {
    /// Issues the loan backing an approved request.
    pub fn issue(request: &BorrowRequest, borrowed_at: DateTime<Utc>, due_date: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::new(),
            borrow_request_id: request.id,
            user_id: request.user_id,
            book_id: request.book_id,
            borrowed_at,
            due_date,
            returned_at: None,
            penalty_cents: 0,
            notes: Some(ISSUED_ON_APPROVAL.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }

    /// Closes the loan.
    pub fn mark_returned(&mut self, at: DateTime<Utc>) -> Result<(), LendingError> {
        if !self.is_active() {
            return Err(LendingError::InvalidState {
                entity: "BorrowTransaction",
                id: self.id.to_string(),
                status: "Returned".to_string(),
                action: "return",
            });
        }
        if at < self.borrowed_at {
            return Err(LendingError::Validation(format!(
                "return date {at} is before borrow date {}",
                self.borrowed_at
            )));
        }
        self.returned_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Duration;

    fn loan(now: DateTime<Utc>) -> BorrowTransaction {
        let request = BorrowRequest::open(UserId::new(), BookId::new(), now);
        BorrowTransaction::issue(&request, now, now + Duration::days(14))
    }

    #[test]
    fn issue_copies_request_identity() {
        let now = Utc::now();
        let request = BorrowRequest::open(UserId::new(), BookId::new(), now);
        let tx = BorrowTransaction::issue(&request, now, now + Duration::days(14));

        assert_eq!(tx.borrow_request_id, request.id);
        assert_eq!(tx.user_id, request.user_id);
        assert_eq!(tx.book_id, request.book_id);
        assert_eq!(tx.penalty_cents, 0);
        assert_eq!(tx.notes.as_deref(), Some(ISSUED_ON_APPROVAL));
        assert!(tx.is_active());
    }

    #[test]
    fn cannot_return_twice() {
        let now = Utc::now();
        let mut tx = loan(now);
        tx.mark_returned(now + Duration::days(1)).unwrap();

        let err = tx.mark_returned(now + Duration::days(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(tx.returned_at, Some(now + Duration::days(1)));
    }

    #[test]
    fn return_before_borrow_is_rejected() {
        let now = Utc::now();
        let mut tx = loan(now);

        let err = tx.mark_returned(now - Duration::hours(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(tx.is_active());
    }
}
