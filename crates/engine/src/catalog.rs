//! Catalog edits and inventory audits.

use std::time::Instant;

use common::{BookId, UserId};
use domain::{
    Book, BookRepository, BookUpdate, BorrowRequestQuery, BorrowStatus, LendingError,
    LendingStore, NewBook, RequestStore, TransactionQuery, TransactionStore,
};
use serde::Serialize;

use crate::clock::Clock;
use crate::engine::{LifecycleEngine, staff};
use crate::publisher::EventPublisher;
use crate::unit_of_work::{Outcome, settle};

/// Stored copy counters compared against the loans on record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InventoryAudit {
    pub book_id: BookId,
    pub total_copies: u32,
    pub available_copies: u32,
    pub active_loans: u32,
}

impl InventoryAudit {
    /// Availability implied by the active loans.
    pub fn expected_available(&self) -> Option<u32> {
        self.total_copies.checked_sub(self.active_loans)
    }

    /// True when `available = total - active loans`.
    pub fn is_consistent(&self) -> bool {
        self.expected_available() == Some(self.available_copies)
    }
}

impl<S, P, C> LifecycleEngine<S, P, C>
where
    S: LendingStore,
    P: EventPublisher,
    C: Clock,
{
    /// Adds a book with every copy available.
    #[tracing::instrument(skip(self))]
    pub async fn add_book(
        &self,
        actor_id: UserId,
        new_book: NewBook,
    ) -> Result<Book, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<Book>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result: Result<Outcome<Book>, LendingError> = async {
                staff(&mut uow, actor_id).await?;
                let book = Book::catalog(new_book)?;
                uow.insert_book(&book).await?;
                Ok(Outcome::quiet(book))
            }
            .await;
            settle(uow, result).await
        }
        .await;
        let book = self.finish("add_book", started, result).await?;

        tracing::info!(book_id = %book.id, total = book.total_copies, "book added");
        Ok(book)
    }

    /// Changes a book's total copies, recomputing availability from its
    /// active loans.
    #[tracing::instrument(skip(self))]
    pub async fn set_total_copies(
        &self,
        actor_id: UserId,
        book_id: BookId,
        total_copies: u32,
    ) -> Result<Book, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<Book>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result: Result<Outcome<Book>, LendingError> = async {
                staff(&mut uow, actor_id).await?;
                let mut book = uow
                    .lock_book(book_id)
                    .await?
                    .ok_or_else(|| LendingError::not_found("Book", book_id))?;
                let active = uow
                    .count_transactions(&TransactionQuery::new().book(book_id).active())
                    .await?;
                book.resize(total_copies, active)?;
                uow.update_book(&book).await?;
                Ok(Outcome::quiet(book))
            }
            .await;
            settle(uow, result).await
        }
        .await;
        let book = self.finish("set_total_copies", started, result).await?;

        tracing::info!(
            total = book.total_copies,
            available = book.available_copies,
            "book copies updated"
        );
        Ok(book)
    }

    /// Replaces a book's catalog details and total copies.
    ///
    /// Availability is recomputed from the active loans; a total below them
    /// is refused.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_book(
        &self,
        actor_id: UserId,
        book_id: BookId,
        update: BookUpdate,
    ) -> Result<Book, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<Book>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result: Result<Outcome<Book>, LendingError> = async {
                staff(&mut uow, actor_id).await?;
                let mut book = uow
                    .lock_book(book_id)
                    .await?
                    .ok_or_else(|| LendingError::not_found("Book", book_id))?;
                let active = uow
                    .count_transactions(&TransactionQuery::new().book(book_id).active())
                    .await?;
                book.apply(update, active)?;
                uow.update_book(&book).await?;
                Ok(Outcome::quiet(book))
            }
            .await;
            settle(uow, result).await
        }
        .await;
        let book = self.finish("update_book", started, result).await?;

        tracing::info!(
            total = book.total_copies,
            available = book.available_copies,
            "book updated"
        );
        Ok(book)
    }

    /// Removes a book that has no active loans and no pending requests,
    /// together with its wishlist entries.
    #[tracing::instrument(skip(self))]
    pub async fn remove_book(&self, actor_id: UserId, book_id: BookId) -> Result<(), LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<()>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result: Result<Outcome<()>, LendingError> = async {
                staff(&mut uow, actor_id).await?;
                uow.lock_book(book_id)
                    .await?
                    .ok_or_else(|| LendingError::not_found("Book", book_id))?;

                let active = uow
                    .count_transactions(&TransactionQuery::new().book(book_id).active())
                    .await?;
                if active > 0 {
                    return Err(LendingError::Conflict(format!(
                        "book {book_id} has {active} active loans"
                    )));
                }
                let pending = uow
                    .count_borrow_requests(
                        &BorrowRequestQuery::new()
                            .book(book_id)
                            .status(BorrowStatus::Pending),
                    )
                    .await?;
                if pending > 0 {
                    return Err(LendingError::Conflict(format!(
                        "book {book_id} has {pending} pending borrow requests"
                    )));
                }

                uow.delete_book(book_id).await?;
                Ok(Outcome::quiet(()))
            }
            .await;
            settle(uow, result).await
        }
        .await;
        self.finish("remove_book", started, result).await?;

        tracing::info!("book removed");
        Ok(())
    }

    pub async fn get_book(&self, book_id: BookId) -> Result<Book, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .find_book(book_id)
            .await
            .map_err(LendingError::from)
            .and_then(|book| book.ok_or_else(|| LendingError::not_found("Book", book_id)))
            .map(Outcome::quiet);
        Ok(settle(uow, result).await?.value)
    }

    /// Lists books ordered by title.
    pub async fn list_books(&self) -> Result<Vec<Book>, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .list_books()
            .await
            .map(Outcome::quiet)
            .map_err(LendingError::from);
        Ok(settle(uow, result).await?.value)
    }

    /// Lists the distinct genres in the catalog, sorted.
    pub async fn list_genres(&self) -> Result<Vec<String>, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .list_genres()
            .await
            .map(Outcome::quiet)
            .map_err(LendingError::from);
        Ok(settle(uow, result).await?.value)
    }

    /// Compares a book's stored counters with its active loans.
    #[tracing::instrument(skip(self))]
    pub async fn check_inventory(&self, book_id: BookId) -> Result<InventoryAudit, LendingError> {
        let mut uow = self.store.begin().await?;
        let result: Result<Outcome<InventoryAudit>, LendingError> = async {
            let book = uow
                .find_book(book_id)
                .await?
                .ok_or_else(|| LendingError::not_found("Book", book_id))?;
            let active_loans = uow
                .count_transactions(&TransactionQuery::new().book(book_id).active())
                .await?;
            Ok(Outcome::quiet(InventoryAudit {
                book_id,
                total_copies: book.total_copies,
                available_copies: book.available_copies,
                active_loans,
            }))
        }
        .await;
        let audit = settle(uow, result).await?.value;

        if !audit.is_consistent() {
            metrics::counter!("lending_inventory_audit_mismatches_total").increment(1);
            tracing::error!(
                total = audit.total_copies,
                available = audit.available_copies,
                active_loans = audit.active_loans,
                "inventory counters disagree with active loans"
            );
        }
        Ok(audit)
    }
}

impl<S, P, C> LifecycleEngine<S, P, C>
where
    S: LendingStore,
    P: EventPublisher,
    C: Clock,
{
    /// Audits every catalogued book and returns those whose counters
    /// disagree with their active loans.
    ///
    /// Books removed while the audit runs are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn audit_catalog(&self) -> Result<Vec<InventoryAudit>, LendingError> {
        let books = self.list_books().await?;
        let checked = books.len();
        let mut drifted = Vec::new();
        for book in books {
            match self.check_inventory(book.id).await {
                Ok(audit) if !audit.is_consistent() => drifted.push(audit),
                Ok(_) | Err(LendingError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(checked, drifted = drifted.len(), "catalog audited");
        Ok(drifted)
    }
}
