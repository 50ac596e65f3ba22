//! Read side of the lending workflow.

use common::{BorrowRequestId, ReturnRequestId, TransactionId, UserId};
use domain::{
    BorrowRequest, BorrowRequestQuery, BorrowTransaction, LendingError, LendingStore,
    RequestStore, ReturnRequest, ReturnRequestQuery, TransactionQuery, TransactionStore,
};

use crate::clock::Clock;
use crate::engine::LifecycleEngine;
use crate::publisher::EventPublisher;
use crate::unit_of_work::{Outcome, settle};

impl<S, P, C> LifecycleEngine<S, P, C>
where
    S: LendingStore,
    P: EventPublisher,
    C: Clock,
{
    pub async fn get_borrow_request(
        &self,
        request_id: BorrowRequestId,
    ) -> Result<BorrowRequest, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .find_borrow_request(request_id)
            .await
            .map_err(LendingError::from)
            .and_then(|r| r.ok_or_else(|| LendingError::not_found("BorrowRequest", request_id)))
            .map(Outcome::quiet);
        Ok(settle(uow, result).await?.value)
    }

    /// Lists borrow requests matching the filter, newest first.
    pub async fn list_borrow_requests(
        &self,
        query: BorrowRequestQuery,
    ) -> Result<Vec<BorrowRequest>, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .list_borrow_requests(&query)
            .await
            .map(Outcome::quiet)
            .map_err(LendingError::from);
        Ok(settle(uow, result).await?.value)
    }

    pub async fn get_return_request(
        &self,
        request_id: ReturnRequestId,
    ) -> Result<ReturnRequest, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .find_return_request(request_id)
            .await
            .map_err(LendingError::from)
            .and_then(|r| r.ok_or_else(|| LendingError::not_found("ReturnRequest", request_id)))
            .map(Outcome::quiet);
        Ok(settle(uow, result).await?.value)
    }

    pub async fn list_return_requests(
        &self,
        query: ReturnRequestQuery,
    ) -> Result<Vec<ReturnRequest>, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .list_return_requests(&query)
            .await
            .map(Outcome::quiet)
            .map_err(LendingError::from);
        Ok(settle(uow, result).await?.value)
    }

    pub async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<BorrowTransaction, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .find_transaction(transaction_id)
            .await
            .map_err(LendingError::from)
            .and_then(|t| {
                t.ok_or_else(|| LendingError::not_found("BorrowTransaction", transaction_id))
            })
            .map(Outcome::quiet);
        Ok(settle(uow, result).await?.value)
    }

    pub async fn list_transactions(
        &self,
        query: TransactionQuery,
    ) -> Result<Vec<BorrowTransaction>, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .list_transactions(&query)
            .await
            .map(Outcome::quiet)
            .map_err(LendingError::from);
        Ok(settle(uow, result).await?.value)
    }

    /// Number of loans the user currently holds.
    pub async fn active_borrow_count(&self, user_id: UserId) -> Result<u32, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .count_transactions(&TransactionQuery::new().user(user_id).active())
            .await
            .map(Outcome::quiet)
            .map_err(LendingError::from);
        Ok(settle(uow, result).await?.value)
    }
}
