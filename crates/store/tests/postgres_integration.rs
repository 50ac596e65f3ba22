//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p lending-store --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::UserId;
use domain::store::{UNIQUE_ACTIVE_LOAN, UNIQUE_NOTIFICATION, UNIQUE_PENDING_BORROW};
use domain::{
    Book, BookRepository, BorrowRequest, BorrowRequestQuery, BorrowStatus, BorrowTransaction,
    LendingStore, NewBook, Notification, NotificationKind, NotificationQuery,
    NotificationRepository, RequestStore, Role,
    StoreError, TransactionQuery, TransactionStore, UnitOfWork, User, UserDirectory,
    WishlistEntry, WishlistRepository,
};
use lending_store::PostgresLendingStore;
use serial_test::serial;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let store = PostgresLendingStore::connect(&connection_string, 1, Duration::from_secs(5))
                .await
                .unwrap();
            store.run_migrations().await.unwrap();
            store.pool().close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresLendingStore {
    let info = get_container_info().await;

    let store = PostgresLendingStore::connect(&info.connection_string, 5, Duration::from_secs(5))
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE notifications, wishlists, return_requests, borrow_transactions, borrow_requests, books, users",
    )
    .execute(store.pool())
    .await
    .unwrap();

    store
}

async fn seed(store: &PostgresLendingStore) -> (User, Book) {
    let user = User::new("Ada", Some("ada@example.com".into()), Role::Student);
    let book = Book::new("Dune", "Herbert", 2);
    let mut uow = store.begin().await.unwrap();
    uow.insert_user(&user).await.unwrap();
    uow.insert_book(&book).await.unwrap();
    uow.commit().await.unwrap();
    (user, book)
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn round_trips_user_and_book() {
    let store = get_test_store().await;
    let (user, book) = seed(&store).await;

    let mut uow = store.begin().await.unwrap();
    assert_eq!(uow.find_user(user.id).await.unwrap(), Some(user));
    assert_eq!(uow.lock_book(book.id).await.unwrap(), Some(book.clone()));
    assert_eq!(uow.list_books().await.unwrap(), vec![book]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn dropped_unit_of_work_rolls_back() {
    let store = get_test_store().await;
    let (_, mut book) = seed(&store).await;

    {
        let mut uow = store.begin().await.unwrap();
        book.reserve_copy().unwrap();
        uow.update_book(&book).await.unwrap();
    }

    let mut uow = store.begin().await.unwrap();
    let stored = uow.find_book(book.id).await.unwrap().unwrap();
    assert_eq!(stored.available_copies, 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn duplicate_pending_request_maps_to_unique_violation() {
    let store = get_test_store().await;
    let (user, book) = seed(&store).await;

    let mut uow = store.begin().await.unwrap();
    uow.insert_borrow_request(&BorrowRequest::open(user.id, book.id, Utc::now()))
        .await
        .unwrap();
    let err = uow
        .insert_borrow_request(&BorrowRequest::open(user.id, book.id, Utc::now()))
        .await
        .unwrap_err();

    assert!(err.is_unique_violation(UNIQUE_PENDING_BORROW));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn second_active_loan_for_same_book_is_rejected() {
    let store = get_test_store().await;
    let (user, book) = seed(&store).await;
    let now = Utc::now();
    let librarian = UserId::new();

    let mut first = BorrowRequest::open(user.id, book.id, now);
    first.approve(librarian, now, now).unwrap();
    let mut second = BorrowRequest::open(user.id, book.id, now);
    second.approve(librarian, now, now).unwrap();

    let mut uow = store.begin().await.unwrap();
    uow.insert_borrow_request(&first).await.unwrap();
    uow.insert_borrow_request(&second).await.unwrap();
    uow.insert_transaction(&BorrowTransaction::issue(&first, now, now))
        .await
        .unwrap();
    let err = uow
        .insert_transaction(&BorrowTransaction::issue(&second, now, now))
        .await
        .unwrap_err();

    assert!(err.is_unique_violation(UNIQUE_ACTIVE_LOAN));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn filters_and_counts() {
    let store = get_test_store().await;
    let (user, book) = seed(&store).await;
    let now = Utc::now();

    let mut approved = BorrowRequest::open(user.id, book.id, now);
    approved.approve(UserId::new(), now, now).unwrap();
    let mut loan = BorrowTransaction::issue(&approved, now, now);

    let mut uow = store.begin().await.unwrap();
    uow.insert_borrow_request(&approved).await.unwrap();
    uow.insert_transaction(&loan).await.unwrap();
    uow.insert_borrow_request(&BorrowRequest::open(user.id, book.id, now))
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let pending = BorrowRequestQuery::new()
        .user(user.id)
        .status(BorrowStatus::Pending);
    assert_eq!(uow.count_borrow_requests(&pending).await.unwrap(), 1);
    assert_eq!(
        uow.list_borrow_requests(&BorrowRequestQuery::new())
            .await
            .unwrap()
            .len(),
        2
    );

    let active = TransactionQuery::new().user(user.id).active();
    assert_eq!(uow.count_transactions(&active).await.unwrap(), 1);

    loan.mark_returned(now).unwrap();
    uow.update_transaction(&loan).await.unwrap();
    assert_eq!(uow.count_transactions(&active).await.unwrap(), 0);
    assert_eq!(
        uow.list_transactions(&TransactionQuery::new().book(book.id))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn deleting_book_cascades_to_wishlist() {
    let store = get_test_store().await;
    let (user, book) = seed(&store).await;

    let mut uow = store.begin().await.unwrap();
    uow.insert_wishlist_entry(&WishlistEntry::new(user.id, book.id, Utc::now()))
        .await
        .unwrap();
    assert_eq!(uow.lock_unnotified_wishlist(book.id).await.unwrap().len(), 1);
    uow.delete_book(book.id).await.unwrap();

    assert!(uow.list_wishlist(user.id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn notification_key_is_unique() {
    let store = get_test_store().await;
    let (user, book) = seed(&store).await;
    let related = book.id.as_uuid();
    let make = || {
        Notification::new(
            user.id,
            NotificationKind::BookAvailable,
            "Book Available",
            "Dune is available",
            related,
            Some(book.id),
            Utc::now(),
        )
    };

    let mut uow = store.begin().await.unwrap();
    uow.insert_notification(&make()).await.unwrap();
    assert!(
        uow.notification_exists(user.id, related, NotificationKind::BookAvailable)
            .await
            .unwrap()
    );
    let err = uow.insert_notification(&make()).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }));
    assert!(err.is_unique_violation(UNIQUE_NOTIFICATION));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn book_details_and_genres_round_trip() {
    let store = get_test_store().await;
    let (mut user, mut book) = seed(&store).await;

    let emma = Book::catalog(
        NewBook::new("Emma", "Jane Austen", 1)
            .isbn("978-0141439587")
            .genre("Classics"),
    )
    .unwrap();
    book.genre = Some("Science Fiction".into());
    book.description = Some("Spice and sandworms".into());
    user.is_blocked = true;

    let mut uow = store.begin().await.unwrap();
    uow.insert_book(&emma).await.unwrap();
    uow.update_book(&book).await.unwrap();
    uow.update_user(&user).await.unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    assert_eq!(uow.find_book(emma.id).await.unwrap(), Some(emma));
    assert_eq!(uow.find_book(book.id).await.unwrap(), Some(book));
    assert_eq!(uow.find_user(user.id).await.unwrap(), Some(user));
    assert_eq!(
        uow.list_genres().await.unwrap(),
        ["Classics", "Science Fiction"]
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn notifications_are_paged_newest_first() {
    let store = get_test_store().await;
    let (user, _) = seed(&store).await;
    let start = Utc::now();

    let mut uow = store.begin().await.unwrap();
    for minute in 0..5 {
        let mut notification = Notification::new(
            user.id,
            NotificationKind::BookAvailable,
            "Book Available",
            format!("notice {minute}"),
            uuid::Uuid::new_v4(),
            None,
            start + chrono::Duration::minutes(minute),
        );
        notification.is_read = minute % 2 == 0;
        uow.insert_notification(&notification).await.unwrap();
    }
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let second = uow
        .list_notifications(user.id, &NotificationQuery::new().page(2, 2))
        .await
        .unwrap();
    let messages: Vec<_> = second.iter().map(|n| n.message.as_str()).collect();
    assert_eq!(messages, ["notice 2", "notice 1"]);

    let unread = uow
        .list_notifications(user.id, &NotificationQuery::new().unread())
        .await
        .unwrap();
    let messages: Vec<_> = unread.iter().map(|n| n.message.as_str()).collect();
    assert_eq!(messages, ["notice 3", "notice 1"]);
}
