//! Persistence ports used by the lifecycle engine and the notifier.
//!
//! Every read and write goes through a [`UnitOfWork`] obtained from
//! [`LendingStore::begin`]. Writes become visible only after
//! [`UnitOfWork::commit`]; dropping a unit of work without committing
//! discards them. `lock_*` reads hold the row until the unit of work ends so
//! that two units deciding on the same row are serialized.

use async_trait::async_trait;
use common::{
    BookId, BorrowRequestId, NotificationId, ReturnRequestId, TransactionId, UserId, WishlistId,
};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    Book, BorrowRequest, BorrowTransaction, Notification, NotificationKind, ReturnRequest, User,
    WishlistEntry,
};
use crate::query::{BorrowRequestQuery, NotificationQuery, ReturnRequestQuery, TransactionQuery};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Name of the unique index allowing one pending borrow request per user and book.
pub const UNIQUE_PENDING_BORROW: &str = "unique_pending_borrow_request";
/// Name of the unique constraint allowing one loan per borrow request.
pub const UNIQUE_TRANSACTION_PER_REQUEST: &str = "unique_transaction_per_request";
/// Name of the unique index allowing one active loan per user and book.
pub const UNIQUE_ACTIVE_LOAN: &str = "unique_active_loan";
/// Name of the unique index allowing one pending return request per loan.
pub const UNIQUE_PENDING_RETURN: &str = "unique_pending_return_request";
/// Name of the unique constraint on wishlist (user, book).
pub const UNIQUE_WISHLIST_ENTRY: &str = "unique_wishlist_entry";
/// Name of the unique constraint on notification (user, related entity, kind).
pub const UNIQUE_NOTIFICATION: &str = "unique_notification";

/// Factory for units of work.
#[async_trait]
pub trait LendingStore: Send + Sync + 'static {
    type Uow: UnitOfWork;

    /// Starts a new unit of work.
    async fn begin(&self) -> StoreResult<Self::Uow>;
}

/// Account lookup.
#[async_trait]
pub trait UserDirectory: Send {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>>;

    /// Reads a user and holds the row, serializing quota checks per user.
    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>>;

    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;

    /// Overwrites an existing user.
    async fn update_user(&mut self, user: &User) -> StoreResult<()>;
}

/// Books and their copy counters.
#[async_trait]
pub trait BookRepository: Send {
    async fn find_book(&mut self, id: BookId) -> StoreResult<Option<Book>>;

    /// Reads a book and holds its row until the unit of work ends.
    async fn lock_book(&mut self, id: BookId) -> StoreResult<Option<Book>>;

    async fn list_books(&mut self) -> StoreResult<Vec<Book>>;

    /// Distinct genres of the catalogued books, sorted.
    async fn list_genres(&mut self) -> StoreResult<Vec<String>>;

    async fn insert_book(&mut self, book: &Book) -> StoreResult<()>;

    async fn update_book(&mut self, book: &Book) -> StoreResult<()>;

    /// Deletes a book together with its wishlist entries.
    async fn delete_book(&mut self, id: BookId) -> StoreResult<()>;
}

/// Borrow and return requests.
#[async_trait]
pub trait RequestStore: Send {
    async fn find_borrow_request(&mut self, id: BorrowRequestId)
    -> StoreResult<Option<BorrowRequest>>;

    async fn lock_borrow_request(&mut self, id: BorrowRequestId)
    -> StoreResult<Option<BorrowRequest>>;

    async fn insert_borrow_request(&mut self, request: &BorrowRequest) -> StoreResult<()>;

    async fn update_borrow_request(&mut self, request: &BorrowRequest) -> StoreResult<()>;

    /// Lists matching requests, newest first.
    async fn list_borrow_requests(
        &mut self,
        query: &BorrowRequestQuery,
    ) -> StoreResult<Vec<BorrowRequest>>;

    async fn count_borrow_requests(&mut self, query: &BorrowRequestQuery) -> StoreResult<u32>;

    async fn find_return_request(&mut self, id: ReturnRequestId)
    -> StoreResult<Option<ReturnRequest>>;

    async fn lock_return_request(&mut self, id: ReturnRequestId)
    -> StoreResult<Option<ReturnRequest>>;

    async fn insert_return_request(&mut self, request: &ReturnRequest) -> StoreResult<()>;

    async fn update_return_request(&mut self, request: &ReturnRequest) -> StoreResult<()>;

    /// Lists matching requests, newest first.
    async fn list_return_requests(
        &mut self,
        query: &ReturnRequestQuery,
    ) -> StoreResult<Vec<ReturnRequest>>;

    async fn count_return_requests(&mut self, query: &ReturnRequestQuery) -> StoreResult<u32>;
}

/// Issued loans.
#[async_trait]
pub trait TransactionStore: Send {
    async fn find_transaction(&mut self, id: TransactionId)
    -> StoreResult<Option<BorrowTransaction>>;

    async fn lock_transaction(&mut self, id: TransactionId)
    -> StoreResult<Option<BorrowTransaction>>;

    async fn insert_transaction(&mut self, transaction: &BorrowTransaction) -> StoreResult<()>;

    async fn update_transaction(&mut self, transaction: &BorrowTransaction) -> StoreResult<()>;

    /// Lists matching loans, newest first.
    async fn list_transactions(
        &mut self,
        query: &TransactionQuery,
    ) -> StoreResult<Vec<BorrowTransaction>>;

    async fn count_transactions(&mut self, query: &TransactionQuery) -> StoreResult<u32>;
}

/// Wishlist entries.
#[async_trait]
pub trait WishlistRepository: Send {
    async fn find_wishlist_entry(&mut self, id: WishlistId) -> StoreResult<Option<WishlistEntry>>;

    async fn find_wishlist_entry_for(
        &mut self,
        user_id: UserId,
        book_id: BookId,
    ) -> StoreResult<Option<WishlistEntry>>;

    async fn list_wishlist(&mut self, user_id: UserId) -> StoreResult<Vec<WishlistEntry>>;

    /// Entries on the book still waiting for an availability notice, locked.
    async fn lock_unnotified_wishlist(&mut self, book_id: BookId)
    -> StoreResult<Vec<WishlistEntry>>;

    async fn insert_wishlist_entry(&mut self, entry: &WishlistEntry) -> StoreResult<()>;

    async fn update_wishlist_entry(&mut self, entry: &WishlistEntry) -> StoreResult<()>;

    async fn delete_wishlist_entry(&mut self, id: WishlistId) -> StoreResult<()>;
}

/// Persisted notifications.
#[async_trait]
pub trait NotificationRepository: Send {
    async fn notification_exists(
        &mut self,
        user_id: UserId,
        related_entity_id: Uuid,
        kind: NotificationKind,
    ) -> StoreResult<bool>;

    async fn find_notification(&mut self, id: NotificationId)
    -> StoreResult<Option<Notification>>;

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()>;

    async fn update_notification(&mut self, notification: &Notification) -> StoreResult<()>;

    /// Lists one page of a user's notifications, newest first.
    async fn list_notifications(
        &mut self,
        user_id: UserId,
        query: &NotificationQuery,
    ) -> StoreResult<Vec<Notification>>;
}

/// A set of reads and writes that commit or roll back together.
#[async_trait]
pub trait UnitOfWork:
    UserDirectory
    + BookRepository
    + RequestStore
    + TransactionStore
    + WishlistRepository
    + NotificationRepository
    + Send
    + Sized
{
    /// Makes every write of this unit visible.
    async fn commit(self) -> StoreResult<()>;

    /// Discards every write of this unit.
    async fn rollback(self) -> StoreResult<()>;
}
