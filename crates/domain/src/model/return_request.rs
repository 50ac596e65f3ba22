use chrono::{DateTime, Utc};
use common::{BookId, ReturnRequestId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use super::status::ReturnStatus;
use crate::error::LendingError;

/// A borrower's request to hand back an active loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: ReturnRequestId,
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub status: ReturnStatus,
    /// Proposed return date, stamped when the request is opened.
    pub return_date: DateTime<Utc>,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

impl ReturnRequest {
    pub fn open(
        transaction_id: TransactionId,
        user_id: UserId,
        book_id: BookId,
        return_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReturnRequestId::new(),
            transaction_id,
            user_id,
            book_id,
            status: ReturnStatus::Pending,
            return_date,
            processed_by: None,
            processed_at: None,
            remarks: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReturnStatus::Pending
    }

    pub fn approve(&mut self, processor_id: UserId, at: DateTime<Utc>) -> Result<(), LendingError> {
        self.status = self.status.approve().ok_or_else(|| self.invalid("approve"))?;
        self.processed_by = Some(processor_id);
        self.processed_at = Some(at);
        Ok(())
    }

    pub fn reject(
        &mut self,
        processor_id: UserId,
        at: DateTime<Utc>,
        remarks: Option<String>,
    ) -> Result<(), LendingError> {
        self.status = self.status.reject().ok_or_else(|| self.invalid("reject"))?;
        self.processed_by = Some(processor_id);
        self.processed_at = Some(at);
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
            entity: "ReturnRequest",
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

    #[test]
    fn reject_then_approve_fails() {
        let now = Utc::now();
        let mut request =
            ReturnRequest::open(TransactionId::new(), UserId::new(), BookId::new(), now);
        request.reject(UserId::new(), now, None).unwrap();

        let err = request.approve(UserId::new(), now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(request.status, ReturnStatus::Rejected);
    }
}
