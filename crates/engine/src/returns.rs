//! Return path: request, approve, reject.

use std::time::Instant;

use common::{ReturnRequestId, UserId};
use domain::{
    Book, BorrowTransaction, LendingError, LendingEvent, LendingStore, NewReturnRequest,
    RequestStore, ReturnRequest, ReturnRequestQuery, ReturnStatus, TransactionStore,
    WishlistRepository,
};

use crate::clock::Clock;
use crate::engine::{LifecycleEngine, requester, staff};
use crate::ledger::InventoryLedger;
use crate::publisher::EventPublisher;
use crate::unit_of_work::{Outcome, settle, unique_to_conflict};

/// Result of an approved return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnApproval {
    pub request: ReturnRequest,
    pub transaction: BorrowTransaction,
    pub book: Book,
    /// Users whose wishlist entries on the book were flagged for an availability notice.
    pub notified: Vec<UserId>,
}

impl<S, P, C> LifecycleEngine<S, P, C>
where
    S: LendingStore,
    P: EventPublisher,
    C: Clock,
{
    /// Opens a pending return request for one of the borrower's active loans.
    #[tracing::instrument(skip(self))]
    pub async fn create_return_request(
        &self,
        user_id: UserId,
        draft: NewReturnRequest,
    ) -> Result<ReturnRequest, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<ReturnRequest>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result = self.open_return(&mut uow, user_id, draft).await;
            settle(uow, result).await
        }
        .await;
        let request = self.finish("create_return_request", started, result).await?;

        metrics::counter!("lending_return_requests_created_total").increment(1);
        tracing::info!(request_id = %request.id, "return request created");
        Ok(request)
    }

    /// Approves a pending return: closes the loan, releases the copy, and
    /// flags waiting wishlist entries.
    #[tracing::instrument(skip(self))]
    pub async fn approve_return_request(
        &self,
        request_id: ReturnRequestId,
        processor_id: UserId,
    ) -> Result<ReturnApproval, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<ReturnApproval>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result = self.approve_return(&mut uow, request_id, processor_id).await;
            settle(uow, result).await
        }
        .await;
        let approval = self.finish("approve_return_request", started, result).await?;

        metrics::counter!("lending_returns_approved_total").increment(1);
        tracing::info!(
            book_id = %approval.book.id,
            available = approval.book.available_copies,
            wishlist_notices = approval.notified.len(),
            "return approved"
        );
        Ok(approval)
    }

    /// Rejects a pending return. The loan stays active and the borrower may
    /// ask again.
    #[tracing::instrument(skip(self, remarks))]
    pub async fn reject_return_request(
        &self,
        request_id: ReturnRequestId,
        processor_id: UserId,
        remarks: Option<String>,
    ) -> Result<ReturnRequest, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<ReturnRequest>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result = self
                .reject_return(&mut uow, request_id, processor_id, remarks)
                .await;
            settle(uow, result).await
        }
        .await;
        let request = self.finish("reject_return_request", started, result).await?;

        metrics::counter!("lending_returns_rejected_total").increment(1);
        tracing::info!("return request rejected");
        Ok(request)
    }

    async fn open_return(
        &self,
        uow: &mut S::Uow,
        user_id: UserId,
        draft: NewReturnRequest,
    ) -> Result<Outcome<ReturnRequest>, LendingError> {
        requester(uow, user_id, false).await?;

        let transaction = uow
            .lock_transaction(draft.transaction_id)
            .await?
            .ok_or_else(|| LendingError::not_found("BorrowTransaction", draft.transaction_id))?;
        if transaction.user_id != user_id {
            return Err(LendingError::Unauthorized(format!(
                "transaction {} does not belong to user {user_id}",
                transaction.id
            )));
        }
        if transaction.book_id != draft.book_id {
            return Err(LendingError::Validation(format!(
                "book {} does not match transaction {}",
                draft.book_id, transaction.id
            )));
        }
        if !transaction.is_active() {
            return Err(LendingError::InvalidState {
                entity: "BorrowTransaction",
                id: transaction.id.to_string(),
                status: "Returned".to_string(),
                action: "return",
            });
        }

        let pending = uow
            .count_return_requests(
                &ReturnRequestQuery::new()
                    .transaction(transaction.id)
                    .status(ReturnStatus::Pending),
            )
            .await?;
        if pending > 0 {
            return Err(LendingError::Conflict(format!(
                "transaction {} already has a pending return request",
                transaction.id
            )));
        }

        let request = ReturnRequest::open(
            transaction.id,
            user_id,
            transaction.book_id,
            self.clock.now(),
        );
        uow.insert_return_request(&request)
            .await
            .map_err(|e| unique_to_conflict(e, "return request"))?;

        Ok(Outcome::quiet(request))
    }

    async fn approve_return(
        &self,
        uow: &mut S::Uow,
        request_id: ReturnRequestId,
        processor_id: UserId,
    ) -> Result<Outcome<ReturnApproval>, LendingError> {
        let mut request = uow
            .lock_return_request(request_id)
            .await?
            .ok_or_else(|| LendingError::not_found("ReturnRequest", request_id))?;
        request.ensure_pending("approve")?;

        staff(uow, processor_id).await?;

        let mut transaction = uow
            .lock_transaction(request.transaction_id)
            .await?
            .ok_or_else(|| LendingError::not_found("BorrowTransaction", request.transaction_id))?;
        if request.return_date < transaction.borrowed_at {
            return Err(LendingError::Validation(format!(
                "return date {} is before borrow date {}",
                request.return_date, transaction.borrowed_at
            )));
        }

        let now = self.clock.now();
        transaction.mark_returned(now)?;
        let book = InventoryLedger::release(uow, transaction.book_id).await?;

        request.approve(processor_id, now)?;
        uow.update_return_request(&request).await?;
        uow.update_transaction(&transaction).await?;

        let mut events = vec![LendingEvent::ReturnApproved {
            request_id: request.id,
            user_id: request.user_id,
            book_id: book.id,
        }];

        let mut notified = Vec::new();
        for mut entry in uow.lock_unnotified_wishlist(book.id).await? {
            entry.is_notified = true;
            uow.update_wishlist_entry(&entry).await?;
            events.push(LendingEvent::BookAvailable {
                book_id: book.id,
                user_id: entry.user_id,
            });
            notified.push(entry.user_id);
        }

        Ok(Outcome {
            value: ReturnApproval {
                request,
                transaction,
                book,
                notified,
            },
            events,
        })
    }

    async fn reject_return(
        &self,
        uow: &mut S::Uow,
        request_id: ReturnRequestId,
        processor_id: UserId,
        remarks: Option<String>,
    ) -> Result<Outcome<ReturnRequest>, LendingError> {
        let mut request = uow
            .lock_return_request(request_id)
            .await?
            .ok_or_else(|| LendingError::not_found("ReturnRequest", request_id))?;
        request.ensure_pending("reject")?;

        staff(uow, processor_id).await?;

        request.reject(processor_id, self.clock.now(), remarks)?;
        uow.update_return_request(&request).await?;

        let event = LendingEvent::ReturnRejected {
            request_id: request.id,
            user_id: request.user_id,
            book_id: request.book_id,
            remarks: request.remarks.clone(),
        };
        Ok(Outcome::with_event(request, event))
    }
}
