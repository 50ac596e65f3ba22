//! Copy counters, mutated only inside engine units of work.

use common::BookId;
use domain::{Book, BookRepository, LendingError};

/// Reserves and releases copies of a book.
///
/// Both operations lock the book row for the rest of the unit of work.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    /// Takes one copy off the shelf.
    pub async fn reserve<U: BookRepository>(
        uow: &mut U,
        book_id: BookId,
    ) -> Result<Book, LendingError> {
        let mut book = uow
            .lock_book(book_id)
            .await?
            .ok_or_else(|| LendingError::not_found("Book", book_id))?;

        book.reserve_copy()?;
        uow.update_book(&book).await?;

        metrics::counter!("lending_copies_reserved_total").increment(1);
        tracing::debug!(%book_id, available = book.available_copies, "copy reserved");
        Ok(book)
    }

    /// Puts one copy back on the shelf.
    ///
    /// Releasing a copy of a book whose copies are all on the shelf is an
    /// invariant violation and fails the unit of work.
    pub async fn release<U: BookRepository>(
        uow: &mut U,
        book_id: BookId,
    ) -> Result<Book, LendingError> {
        let mut book = uow
            .lock_book(book_id)
            .await?
            .ok_or_else(|| LendingError::not_found("Book", book_id))?;

        if let Err(e) = book.release_copy() {
            metrics::counter!("lending_inventory_invariant_violations_total").increment(1);
            tracing::error!(
                %book_id,
                available = book.available_copies,
                total = book.total_copies,
                "release would exceed total copies"
            );
            return Err(e);
        }
        uow.update_book(&book).await?;

        metrics::counter!("lending_copies_released_total").increment(1);
        tracing::debug!(%book_id, available = book.available_copies, "copy released");
        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ErrorKind, LendingStore, UnitOfWork};
    use lending_store::InMemoryLendingStore;

    async fn store_with(book: &Book) -> InMemoryLendingStore {
        let store = InMemoryLendingStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_book(book).await.unwrap();
        uow.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn reserve_and_release_round_trip() {
        let book = Book::new("Dune", "Herbert", 1);
        let store = store_with(&book).await;
        let mut uow = store.begin().await.unwrap();

        let reserved = InventoryLedger::reserve(&mut uow, book.id).await.unwrap();
        assert_eq!(reserved.available_copies, 0);

        let err = InventoryLedger::reserve(&mut uow, book.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCopiesAvailable);

        let released = InventoryLedger::release(&mut uow, book.id).await.unwrap();
        assert_eq!(released.available_copies, 1);
    }

    #[tokio::test]
    async fn over_release_fails_loudly() {
        let book = Book::new("Dune", "Herbert", 1);
        let store = store_with(&book).await;
        let mut uow = store.begin().await.unwrap();

        let err = InventoryLedger::release(&mut uow, book.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InventoryInvariant);
        assert_eq!(
            uow.find_book(book.id).await.unwrap().unwrap().available_copies,
            1
        );
    }

    #[tokio::test]
    async fn unknown_book_is_not_found() {
        let store = InMemoryLendingStore::new();
        let mut uow = store.begin().await.unwrap();
        let err = InventoryLedger::reserve(&mut uow, BookId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
