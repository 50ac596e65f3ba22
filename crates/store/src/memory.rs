use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    BookId, BorrowRequestId, NotificationId, ReturnRequestId, TransactionId, UserId, WishlistId,
};
use domain::store::{
    UNIQUE_ACTIVE_LOAN, UNIQUE_NOTIFICATION, UNIQUE_PENDING_BORROW, UNIQUE_PENDING_RETURN,
    UNIQUE_TRANSACTION_PER_REQUEST, UNIQUE_WISHLIST_ENTRY,
};
use domain::{
    Book, BookRepository, BorrowRequest, BorrowRequestQuery, BorrowTransaction, LendingStore,
    Notification, NotificationKind, NotificationQuery, NotificationRepository, RequestStore, ReturnRequest,
    ReturnRequestQuery, StoreError, StoreResult, TransactionQuery, TransactionStore, UnitOfWork,
    User, UserDirectory, WishlistEntry, WishlistRepository,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    books: HashMap<BookId, Book>,
    borrow_requests: HashMap<BorrowRequestId, BorrowRequest>,
    transactions: HashMap<TransactionId, BorrowTransaction>,
    return_requests: HashMap<ReturnRequestId, ReturnRequest>,
    wishlist: HashMap<WishlistId, WishlistEntry>,
    notifications: HashMap<NotificationId, Notification>,
}

/// In-memory lending store for tests and database-less deployments.
///
/// Units of work run one at a time: `begin` waits for the previous unit to
/// finish, then works on a private copy of the state that `commit` writes
/// back. Unique constraints of the PostgreSQL schema are enforced on insert.
#[derive(Clone, Default)]
pub struct InMemoryLendingStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLendingStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LendingStore for InMemoryLendingStore {
    type Uow = InMemoryUnitOfWork;

    async fn begin(&self) -> StoreResult<InMemoryUnitOfWork> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryUnitOfWork { guard, working })
    }
}

/// Unit of work over [`InMemoryLendingStore`]. Dropping it discards its writes.
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

fn missing(entity: &str, id: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{entity} {id} does not exist"))
}

#[async_trait]
impl UserDirectory for InMemoryUnitOfWork {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        self.find_user(id).await
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        let slot = self
            .working
            .users
            .get_mut(&user.id)
            .ok_or_else(|| missing("user", user.id))?;
        *slot = user.clone();
        Ok(())
    }
}

#[async_trait]
impl BookRepository for InMemoryUnitOfWork {
    async fn find_book(&mut self, id: BookId) -> StoreResult<Option<Book>> {
        Ok(self.working.books.get(&id).cloned())
    }

    async fn lock_book(&mut self, id: BookId) -> StoreResult<Option<Book>> {
        self.find_book(id).await
    }

    async fn list_books(&mut self) -> StoreResult<Vec<Book>> {
        let mut books: Vec<Book> = self.working.books.values().cloned().collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(books)
    }

    async fn list_genres(&mut self) -> StoreResult<Vec<String>> {
        let genres: BTreeSet<String> = self
            .working
            .books
            .values()
            .filter_map(|book| book.genre.clone())
            .collect();
        Ok(genres.into_iter().collect())
    }

    async fn insert_book(&mut self, book: &Book) -> StoreResult<()> {
        self.working.books.insert(book.id, book.clone());
        Ok(())
    }

    async fn update_book(&mut self, book: &Book) -> StoreResult<()> {
        let slot = self
            .working
            .books
            .get_mut(&book.id)
            .ok_or_else(|| missing("book", book.id))?;
        *slot = book.clone();
        Ok(())
    }

    async fn delete_book(&mut self, id: BookId) -> StoreResult<()> {
        self.working.books.remove(&id);
        self.working.wishlist.retain(|_, entry| entry.book_id != id);
        Ok(())
    }
}

#[async_trait]
impl RequestStore for InMemoryUnitOfWork {
    async fn find_borrow_request(
        &mut self,
        id: BorrowRequestId,
    ) -> StoreResult<Option<BorrowRequest>> {
        Ok(self.working.borrow_requests.get(&id).cloned())
    }

    async fn lock_borrow_request(
        &mut self,
        id: BorrowRequestId,
    ) -> StoreResult<Option<BorrowRequest>> {
        self.find_borrow_request(id).await
    }

    async fn insert_borrow_request(&mut self, request: &BorrowRequest) -> StoreResult<()> {
        let duplicate = request.is_pending()
            && self.working.borrow_requests.values().any(|r| {
                r.is_pending() && r.user_id == request.user_id && r.book_id == request.book_id
            });
        if duplicate {
            return Err(unique(UNIQUE_PENDING_BORROW));
        }
        self.working
            .borrow_requests
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn update_borrow_request(&mut self, request: &BorrowRequest) -> StoreResult<()> {
        let slot = self
            .working
            .borrow_requests
            .get_mut(&request.id)
            .ok_or_else(|| missing("borrow request", request.id))?;
        *slot = request.clone();
        Ok(())
    }

    async fn list_borrow_requests(
        &mut self,
        query: &BorrowRequestQuery,
    ) -> StoreResult<Vec<BorrowRequest>> {
        let mut requests: Vec<BorrowRequest> = self
            .working
            .borrow_requests
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        requests.sort_by_key(|r| Reverse(r.requested_at));
        Ok(requests)
    }

    async fn count_borrow_requests(&mut self, query: &BorrowRequestQuery) -> StoreResult<u32> {
        let count = self
            .working
            .borrow_requests
            .values()
            .filter(|r| query.matches(r))
            .count();
        Ok(count as u32)
    }

    async fn find_return_request(
        &mut self,
        id: ReturnRequestId,
    ) -> StoreResult<Option<ReturnRequest>> {
        Ok(self.working.return_requests.get(&id).cloned())
    }

    async fn lock_return_request(
        &mut self,
        id: ReturnRequestId,
    ) -> StoreResult<Option<ReturnRequest>> {
        self.find_return_request(id).await
    }

    async fn insert_return_request(&mut self, request: &ReturnRequest) -> StoreResult<()> {
        let duplicate = request.is_pending()
            && self
                .working
                .return_requests
                .values()
                .any(|r| r.is_pending() && r.transaction_id == request.transaction_id);
        if duplicate {
            return Err(unique(UNIQUE_PENDING_RETURN));
        }
        self.working
            .return_requests
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn update_return_request(&mut self, request: &ReturnRequest) -> StoreResult<()> {
        let slot = self
            .working
            .return_requests
            .get_mut(&request.id)
            .ok_or_else(|| missing("return request", request.id))?;
        *slot = request.clone();
        Ok(())
    }

    async fn list_return_requests(
        &mut self,
        query: &ReturnRequestQuery,
    ) -> StoreResult<Vec<ReturnRequest>> {
        let mut requests: Vec<ReturnRequest> = self
            .working
            .return_requests
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        requests.sort_by_key(|r| Reverse(r.return_date));
        Ok(requests)
    }

    async fn count_return_requests(&mut self, query: &ReturnRequestQuery) -> StoreResult<u32> {
        let count = self
            .working
            .return_requests
            .values()
            .filter(|r| query.matches(r))
            .count();
        Ok(count as u32)
    }
}

#[async_trait]
impl TransactionStore for InMemoryUnitOfWork {
    async fn find_transaction(
        &mut self,
        id: TransactionId,
    ) -> StoreResult<Option<BorrowTransaction>> {
        Ok(self.working.transactions.get(&id).cloned())
    }

    async fn lock_transaction(
        &mut self,
        id: TransactionId,
    ) -> StoreResult<Option<BorrowTransaction>> {
        self.find_transaction(id).await
    }

    async fn insert_transaction(&mut self, transaction: &BorrowTransaction) -> StoreResult<()> {
        let existing = self.working.transactions.values();
        for tx in existing {
            if tx.borrow_request_id == transaction.borrow_request_id {
                return Err(unique(UNIQUE_TRANSACTION_PER_REQUEST));
            }
            if transaction.is_active()
                && tx.is_active()
                && tx.user_id == transaction.user_id
                && tx.book_id == transaction.book_id
            {
                return Err(unique(UNIQUE_ACTIVE_LOAN));
            }
        }
        self.working
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn update_transaction(&mut self, transaction: &BorrowTransaction) -> StoreResult<()> {
        let slot = self
            .working
            .transactions
            .get_mut(&transaction.id)
            .ok_or_else(|| missing("transaction", transaction.id))?;
        *slot = transaction.clone();
        Ok(())
    }

    async fn list_transactions(
        &mut self,
        query: &TransactionQuery,
    ) -> StoreResult<Vec<BorrowTransaction>> {
        let mut transactions: Vec<BorrowTransaction> = self
            .working
            .transactions
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        transactions.sort_by_key(|t| Reverse(t.borrowed_at));
        Ok(transactions)
    }

    async fn count_transactions(&mut self, query: &TransactionQuery) -> StoreResult<u32> {
        let count = self
            .working
            .transactions
            .values()
            .filter(|t| query.matches(t))
            .count();
        Ok(count as u32)
    }
}

#[async_trait]
impl WishlistRepository for InMemoryUnitOfWork {
    async fn find_wishlist_entry(&mut self, id: WishlistId) -> StoreResult<Option<WishlistEntry>> {
        Ok(self.working.wishlist.get(&id).cloned())
    }

    async fn find_wishlist_entry_for(
        &mut self,
        user_id: UserId,
        book_id: BookId,
    ) -> StoreResult<Option<WishlistEntry>> {
        Ok(self
            .working
            .wishlist
            .values()
            .find(|e| e.user_id == user_id && e.book_id == book_id)
            .cloned())
    }

    async fn list_wishlist(&mut self, user_id: UserId) -> StoreResult<Vec<WishlistEntry>> {
        let mut entries: Vec<WishlistEntry> = self
            .working
            .wishlist
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| Reverse(e.added_at));
        Ok(entries)
    }

    async fn lock_unnotified_wishlist(
        &mut self,
        book_id: BookId,
    ) -> StoreResult<Vec<WishlistEntry>> {
        let mut entries: Vec<WishlistEntry> = self
            .working
            .wishlist
            .values()
            .filter(|e| e.book_id == book_id && !e.is_notified)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.added_at);
        Ok(entries)
    }

    async fn insert_wishlist_entry(&mut self, entry: &WishlistEntry) -> StoreResult<()> {
        if self
            .working
            .wishlist
            .values()
            .any(|e| e.user_id == entry.user_id && e.book_id == entry.book_id)
        {
            return Err(unique(UNIQUE_WISHLIST_ENTRY));
        }
        self.working.wishlist.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn update_wishlist_entry(&mut self, entry: &WishlistEntry) -> StoreResult<()> {
        let slot = self
            .working
            .wishlist
            .get_mut(&entry.id)
            .ok_or_else(|| missing("wishlist entry", entry.id))?;
        *slot = entry.clone();
        Ok(())
    }

    async fn delete_wishlist_entry(&mut self, id: WishlistId) -> StoreResult<()> {
        self.working.wishlist.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for InMemoryUnitOfWork {
    async fn notification_exists(
        &mut self,
        user_id: UserId,
        related_entity_id: Uuid,
        kind: NotificationKind,
    ) -> StoreResult<bool> {
        Ok(self.working.notifications.values().any(|n| {
            n.user_id == user_id && n.related_entity_id == related_entity_id && n.kind == kind
        }))
    }

    async fn find_notification(
        &mut self,
        id: NotificationId,
    ) -> StoreResult<Option<Notification>> {
        Ok(self.working.notifications.get(&id).cloned())
    }

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        if self
            .notification_exists(
                notification.user_id,
                notification.related_entity_id,
                notification.kind,
            )
            .await?
        {
            return Err(unique(UNIQUE_NOTIFICATION));
        }
        self.working
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn update_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        let slot = self
            .working
            .notifications
            .get_mut(&notification.id)
            .ok_or_else(|| missing("notification", notification.id))?;
        *slot = notification.clone();
        Ok(())
    }

    async fn list_notifications(
        &mut self,
        user_id: UserId,
        query: &NotificationQuery,
    ) -> StoreResult<Vec<Notification>> {
        let mut notifications: Vec<&Notification> = self
            .working
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && query.matches(n))
            .collect();
        notifications.sort_by_key(|n| Reverse((n.created_at, n.id)));
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        Ok(notifications
            .into_iter()
            .skip(offset)
            .take(query.page_size as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self) -> StoreResult<()> {
        let InMemoryUnitOfWork { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{BorrowStatus, Role};

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = InMemoryLendingStore::new();
        let book = Book::new("Dune", "Herbert", 1);

        let mut uow = store.begin().await.unwrap();
        uow.insert_book(&book).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.find_book(book.id).await.unwrap(), Some(book));
    }

    #[tokio::test]
    async fn dropped_unit_discards_writes() {
        let store = InMemoryLendingStore::new();
        let user = User::new("Ada", None, Role::Student);

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_user(&user).await.unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        uow.insert_user(&User::new("Lin", None, Role::Librarian))
            .await
            .unwrap();
        uow.rollback().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(uow.find_user(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_pending_request_violates_unique_index() {
        let store = InMemoryLendingStore::new();
        let user = UserId::new();
        let book = BookId::new();

        let mut uow = store.begin().await.unwrap();
        uow.insert_borrow_request(&BorrowRequest::open(user, book, Utc::now()))
            .await
            .unwrap();
        let err = uow
            .insert_borrow_request(&BorrowRequest::open(user, book, Utc::now()))
            .await
            .unwrap_err();

        assert!(err.is_unique_violation(UNIQUE_PENDING_BORROW));
    }

    #[tokio::test]
    async fn count_respects_status_filter() {
        let store = InMemoryLendingStore::new();
        let user = UserId::new();
        let now = Utc::now();
        let mut approved = BorrowRequest::open(user, BookId::new(), now);
        approved.approve(UserId::new(), now, now).unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.insert_borrow_request(&approved).await.unwrap();
        uow.insert_borrow_request(&BorrowRequest::open(user, BookId::new(), now))
            .await
            .unwrap();

        let pending = BorrowRequestQuery::new()
            .user(user)
            .status(BorrowStatus::Pending);
        assert_eq!(uow.count_borrow_requests(&pending).await.unwrap(), 1);
        assert_eq!(
            uow.count_borrow_requests(&BorrowRequestQuery::new().user(user))
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn deleting_book_removes_its_wishlist_entries() {
        let store = InMemoryLendingStore::new();
        let book = Book::new("Dune", "Herbert", 1);
        let user = UserId::new();

        let mut uow = store.begin().await.unwrap();
        uow.insert_book(&book).await.unwrap();
        uow.insert_wishlist_entry(&WishlistEntry::new(user, book.id, Utc::now()))
            .await
            .unwrap();
        uow.delete_book(book.id).await.unwrap();

        assert!(uow.list_wishlist(user).await.unwrap().is_empty());
        assert!(uow.find_book(book.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn notifications_page_newest_first() {
        let store = InMemoryLendingStore::new();
        let user = UserId::new();
        let start = Utc::now();

        let mut uow = store.begin().await.unwrap();
        for minute in 0..5 {
            let mut notification = Notification::new(
                user,
                NotificationKind::BookAvailable,
                "Book available",
                format!("notice {minute}"),
                Uuid::new_v4(),
                None,
                start + chrono::Duration::minutes(minute),
            );
            notification.is_read = minute % 2 == 0;
            uow.insert_notification(&notification).await.unwrap();
        }

        let first = uow
            .list_notifications(user, &NotificationQuery::new().page(1, 2))
            .await
            .unwrap();
        let messages: Vec<_> = first.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, ["notice 4", "notice 3"]);

        let last = uow
            .list_notifications(user, &NotificationQuery::new().page(3, 2))
            .await
            .unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].message, "notice 0");

        let unread = uow
            .list_notifications(user, &NotificationQuery::new().unread())
            .await
            .unwrap();
        let messages: Vec<_> = unread.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, ["notice 3", "notice 1"]);

        assert!(
            uow.list_notifications(UserId::new(), &NotificationQuery::new())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn genres_are_distinct_and_sorted() {
        let store = InMemoryLendingStore::new();
        let mut uow = store.begin().await.unwrap();
        for (title, genre) in [
            ("Dune", Some("Science Fiction")),
            ("Emma", Some("Classics")),
            ("Foundation", Some("Science Fiction")),
            ("Untagged", None),
        ] {
            let mut book = Book::new(title, "Author", 1);
            book.genre = genre.map(str::to_string);
            uow.insert_book(&book).await.unwrap();
        }

        assert_eq!(
            uow.list_genres().await.unwrap(),
            ["Classics", "Science Fiction"]
        );
    }

    #[tokio::test]
    async fn updating_unknown_user_fails() {
        let store = InMemoryLendingStore::new();
        let mut user = User::new("Ada", None, Role::Student);

        let mut uow = store.begin().await.unwrap();
        assert!(uow.update_user(&user).await.is_err());

        uow.insert_user(&user).await.unwrap();
        user.is_blocked = true;
        uow.update_user(&user).await.unwrap();
        assert!(uow.find_user(user.id).await.unwrap().unwrap().is_blocked);
    }
}
