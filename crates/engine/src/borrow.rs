//! Borrow path: request, approve, reject.

use std::time::Instant;

use common::{BookId, BorrowRequestId, UserId};
use domain::{
    BookRepository, BorrowRequest, BorrowRequestQuery, BorrowStatus, BorrowTransaction,
    LendingError, LendingEvent, LendingStore, RequestStore, TransactionQuery, TransactionStore,
};

use crate::clock::Clock;
use crate::engine::{LifecycleEngine, requester, staff};
use crate::ledger::InventoryLedger;
use crate::publisher::EventPublisher;
use crate::unit_of_work::{Outcome, settle, unique_to_conflict};

/// Result of an approved borrow request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowApproval {
    pub request: BorrowRequest,
    pub transaction: BorrowTransaction,
}

impl<S, P, C> LifecycleEngine<S, P, C>
where
    S: LendingStore,
    P: EventPublisher,
    C: Clock,
{
    /// Opens a pending borrow request for a student.
    ///
    /// The availability check here is advisory; copies are only taken at
    /// approval time.
    #[tracing::instrument(skip(self))]
    pub async fn create_borrow_request(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<BorrowRequest, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<BorrowRequest>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result = self.open_borrow(&mut uow, user_id, book_id).await;
            settle(uow, result).await
        }
        .await;
        let request = self.finish("create_borrow_request", started, result).await?;

        metrics::counter!("lending_borrow_requests_created_total").increment(1);
        tracing::info!(request_id = %request.id, "borrow request created");
        Ok(request)
    }

    /// Approves a pending request, taking a copy and issuing a loan.
    #[tracing::instrument(skip(self))]
    pub async fn approve_borrow_request(
        &self,
        request_id: BorrowRequestId,
        approver_id: UserId,
    ) -> Result<BorrowApproval, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<BorrowApproval>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result = self.approve_borrow(&mut uow, request_id, approver_id).await;
            settle(uow, result).await
        }
        .await;
        let approval = self.finish("approve_borrow_request", started, result).await?;

        metrics::counter!("lending_borrow_requests_approved_total").increment(1);
        tracing::info!(
            transaction_id = %approval.transaction.id,
            due_date = %approval.transaction.due_date,
            "borrow request approved"
        );
        Ok(approval)
    }

    /// Rejects a pending request. Inventory is untouched.
    #[tracing::instrument(skip(self, remarks))]
    pub async fn reject_borrow_request(
        &self,
        request_id: BorrowRequestId,
        approver_id: UserId,
        remarks: Option<String>,
    ) -> Result<BorrowRequest, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<BorrowRequest>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result = self
                .reject_borrow(&mut uow, request_id, approver_id, remarks)
                .await;
            settle(uow, result).await
        }
        .await;
        let request = self.finish("reject_borrow_request", started, result).await?;

        metrics::counter!("lending_borrow_requests_rejected_total").increment(1);
        tracing::info!("borrow request rejected");
        Ok(request)
    }

    async fn open_borrow(
        &self,
        uow: &mut S::Uow,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Outcome<BorrowRequest>, LendingError> {
        // The user row lock serializes quota checks for one user.
        requester(uow, user_id, true).await?;

        let active_on_book = uow
            .count_transactions(&TransactionQuery::new().user(user_id).book(book_id).active())
            .await?;
        if active_on_book > 0 {
            return Err(LendingError::Conflict(format!(
                "user {user_id} already has book {book_id} on loan"
            )));
        }

        let pending_on_book = uow
            .count_borrow_requests(
                &BorrowRequestQuery::new()
                    .user(user_id)
                    .book(book_id)
                    .status(BorrowStatus::Pending),
            )
            .await?;
        if pending_on_book > 0 {
            return Err(LendingError::Conflict(format!(
                "user {user_id} already has a pending request for book {book_id}"
            )));
        }

        let active = uow
            .count_transactions(&TransactionQuery::new().user(user_id).active())
            .await?;
        let pending = uow
            .count_borrow_requests(
                &BorrowRequestQuery::new()
                    .user(user_id)
                    .status(BorrowStatus::Pending),
            )
            .await?;
        if active + pending >= self.policy.max_borrows {
            return Err(LendingError::QuotaExceeded {
                user_id,
                limit: self.policy.max_borrows,
            });
        }

        // Holding the book row keeps a concurrent removal from slipping in
        // between this check and the insert.
        let book = uow
            .lock_book(book_id)
            .await?
            .ok_or_else(|| LendingError::not_found("Book", book_id))?;
        if !book.has_available_copy() {
            return Err(LendingError::NoCopiesAvailable(book_id));
        }

        let request = BorrowRequest::open(user_id, book_id, self.clock.now());
        uow.insert_borrow_request(&request)
            .await
            .map_err(|e| unique_to_conflict(e, "borrow request"))?;

        Ok(Outcome::quiet(request))
    }

    async fn approve_borrow(
        &self,
        uow: &mut S::Uow,
        request_id: BorrowRequestId,
        approver_id: UserId,
    ) -> Result<Outcome<BorrowApproval>, LendingError> {
        let mut request = uow
            .lock_borrow_request(request_id)
            .await?
            .ok_or_else(|| LendingError::not_found("BorrowRequest", request_id))?;
        request.ensure_pending("approve")?;

        staff(uow, approver_id).await?;

        let user_id = request.user_id;
        let active = uow
            .count_transactions(&TransactionQuery::new().user(user_id).active())
            .await?;
        if active >= self.policy.max_borrows {
            return Err(LendingError::QuotaExceeded {
                user_id,
                limit: self.policy.max_borrows,
            });
        }

        let active_on_book = uow
            .count_transactions(
                &TransactionQuery::new()
                    .user(user_id)
                    .book(request.book_id)
                    .active(),
            )
            .await?;
        if active_on_book > 0 {
            return Err(LendingError::Conflict(format!(
                "user {user_id} still has book {} on loan",
                request.book_id
            )));
        }

        InventoryLedger::reserve(uow, request.book_id).await?;

        let now = self.clock.now();
        let due_date = self.policy.due_date(now)?;
        request.approve(approver_id, now, due_date)?;
        uow.update_borrow_request(&request).await?;

        let transaction = BorrowTransaction::issue(&request, now, due_date);
        uow.insert_transaction(&transaction)
            .await
            .map_err(|e| unique_to_conflict(e, "loan"))?;

        let event = LendingEvent::BorrowApproved {
            request_id: request.id,
            user_id,
            book_id: request.book_id,
            due_date,
        };
        Ok(Outcome::with_event(
            BorrowApproval {
                request,
                transaction,
            },
            event,
        ))
    }

    async fn reject_borrow(
        &self,
        uow: &mut S::Uow,
        request_id: BorrowRequestId,
        approver_id: UserId,
        remarks: Option<String>,
    ) -> Result<Outcome<BorrowRequest>, LendingError> {
        let mut request = uow
            .lock_borrow_request(request_id)
            .await?
            .ok_or_else(|| LendingError::not_found("BorrowRequest", request_id))?;
        request.ensure_pending("reject")?;

        staff(uow, approver_id).await?;

        request.reject(approver_id, self.clock.now(), remarks)?;
        uow.update_borrow_request(&request).await?;

        let event = LendingEvent::BorrowRejected {
            request_id: request.id,
            user_id: request.user_id,
            book_id: request.book_id,
            remarks: request.remarks.clone(),
        };
        Ok(Outcome::with_event(request, event))
    }
}
