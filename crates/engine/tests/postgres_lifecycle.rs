//! Lifecycle races against PostgreSQL row locks.
//!
//! These tests share one PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p engine --test postgres_lifecycle -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{BookId, UserId};
use domain::{
    ErrorKind, LendingError, LendingEvent, LendingStore, NewBook, NewReturnRequest, Role,
    UnitOfWork, User, UserDirectory,
};
use engine::{BorrowApproval, LendingPolicy, LifecycleEngine, RecordingPublisher};
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

type PgEngine = LifecycleEngine<PostgresLendingStore, RecordingPublisher>;

struct TestHarness {
    engine: Arc<PgEngine>,
    store: PostgresLendingStore,
    events: RecordingPublisher,
    librarian: UserId,
}

impl TestHarness {
    /// Fresh pool, cleared tables, one librarian.
    async fn new(policy: LendingPolicy) -> Self {
        let info = get_container_info().await;
        let store =
            PostgresLendingStore::connect(&info.connection_string, 8, Duration::from_secs(10))
                .await
                .unwrap();
        sqlx::query(
            "TRUNCATE TABLE notifications, wishlists, return_requests, borrow_transactions, borrow_requests, books, users",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let events = RecordingPublisher::new();
        let engine = LifecycleEngine::new(store.clone(), events.clone()).with_policy(policy);
        let h = Self {
            engine: Arc::new(engine),
            store,
            events,
            librarian: UserId::new(),
        };
        let librarian = h.user(Role::Librarian).await;
        Self { librarian, ..h }
    }

    async fn user(&self, role: Role) -> UserId {
        let user = User::new("Test User", None, role);
        let mut uow = self.store.begin().await.unwrap();
        uow.insert_user(&user).await.unwrap();
        uow.commit().await.unwrap();
        user.id
    }

    async fn book(&self, copies: u32) -> BookId {
        self.engine
            .add_book(self.librarian, NewBook::new("Dune", "Frank Herbert", copies))
            .await
            .unwrap()
            .id
    }

    async fn borrow(&self, user_id: UserId, book_id: BookId) -> BorrowApproval {
        let request = self
            .engine
            .create_borrow_request(user_id, book_id)
            .await
            .unwrap();
        self.engine
            .approve_borrow_request(request.id, self.librarian)
            .await
            .unwrap()
    }

    async fn assert_consistent(&self, book_id: BookId) {
        let audit = self.engine.check_inventory(book_id).await.unwrap();
        assert!(audit.is_consistent(), "inventory drifted: {audit:?}");
    }
}

/// Splits results into successes and error kinds.
fn partition<T>(results: Vec<Result<T, LendingError>>) -> (Vec<T>, Vec<ErrorKind>) {
    let mut ok = Vec::new();
    let mut failed = Vec::new();
    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) => failed.push(e.kind()),
        }
    }
    (ok, failed)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn concurrent_approvals_share_the_last_copy() {
    let h = TestHarness::new(LendingPolicy::default()).await;
    let book = h.book(1).await;
    let mut requests = Vec::new();
    for _ in 0..2 {
        let student = h.user(Role::Student).await;
        requests.push(h.engine.create_borrow_request(student, book).await.unwrap());
    }

    let handles: Vec<_> = requests
        .iter()
        .map(|request| {
            let engine = h.engine.clone();
            let (request_id, librarian) = (request.id, h.librarian);
            tokio::spawn(async move { engine.approve_borrow_request(request_id, librarian).await })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let (approved, failed) = partition(results);
    assert_eq!(approved.len(), 1);
    assert_eq!(failed, vec![ErrorKind::NoCopiesAvailable]);
    assert_eq!(h.engine.get_book(book).await.unwrap().available_copies, 0);
    h.assert_consistent(book).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn double_approval_of_one_request_issues_one_loan() {
    let h = TestHarness::new(LendingPolicy::default()).await;
    let book = h.book(3).await;
    let student = h.user(Role::Student).await;
    let request = h.engine.create_borrow_request(student, book).await.unwrap();
    let second_librarian = h.user(Role::Librarian).await;

    let handles: Vec<_> = [h.librarian, second_librarian]
        .into_iter()
        .map(|librarian| {
            let engine = h.engine.clone();
            let request_id = request.id;
            tokio::spawn(async move { engine.approve_borrow_request(request_id, librarian).await })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let (approved, failed) = partition(results);
    assert_eq!(approved.len(), 1);
    assert_eq!(failed, vec![ErrorKind::InvalidState]);
    assert_eq!(h.engine.active_borrow_count(student).await.unwrap(), 1);
    assert_eq!(h.engine.get_book(book).await.unwrap().available_copies, 2);
    h.assert_consistent(book).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn concurrent_creates_stop_at_the_borrow_limit() {
    let h = TestHarness::new(LendingPolicy::new(2, 14)).await;
    let student = h.user(Role::Student).await;
    let mut books = Vec::new();
    for _ in 0..4 {
        books.push(h.book(1).await);
    }

    let handles: Vec<_> = books
        .iter()
        .map(|&book| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.create_borrow_request(student, book).await })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let (created, failed) = partition(results);
    assert_eq!(created.len(), 2);
    assert_eq!(
        failed,
        vec![ErrorKind::QuotaExceeded, ErrorKind::QuotaExceeded]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn request_racing_removal_leaves_no_orphan() {
    let h = TestHarness::new(LendingPolicy::default()).await;

    for _ in 0..10 {
        let book = h.book(1).await;
        let student = h.user(Role::Student).await;

        let create = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.create_borrow_request(student, book).await })
        };
        let remove = {
            let engine = h.engine.clone();
            let librarian = h.librarian;
            tokio::spawn(async move { engine.remove_book(librarian, book).await })
        };
        let created = create.await.unwrap();
        let removed = remove.await.unwrap();

        match (created, removed) {
            (Ok(_), Err(e)) => {
                assert_eq!(e.kind(), ErrorKind::Conflict);
                assert!(h.engine.get_book(book).await.is_ok());
            }
            (Err(e), Ok(())) => assert_eq!(e.kind(), ErrorKind::NotFound),
            other => panic!("request and removal both settled as {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn wishlist_add_racing_return_is_notified() {
    let h = TestHarness::new(LendingPolicy::default()).await;

    for _ in 0..10 {
        let book = h.book(1).await;
        let borrower = h.user(Role::Student).await;
        let fan = h.user(Role::Student).await;
        let approval = h.borrow(borrower, book).await;
        let ret = h
            .engine
            .create_return_request(
                borrower,
                NewReturnRequest {
                    transaction_id: approval.transaction.id,
                    book_id: book,
                },
            )
            .await
            .unwrap();
        h.events.clear();

        let add = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.add_to_wishlist(fan, book).await })
        };
        let give_back = {
            let engine = h.engine.clone();
            let librarian = h.librarian;
            tokio::spawn(async move { engine.approve_return_request(ret.id, librarian).await })
        };
        let entry = add.await.unwrap().unwrap();
        give_back.await.unwrap().unwrap();

        let stored = h.engine.list_wishlist(fan).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, entry.id);
        assert!(stored[0].is_notified, "entry left waiting on a shelved copy");

        let notices = h
            .events
            .events()
            .into_iter()
            .filter(|e| {
                matches!(e, LendingEvent::BookAvailable { user_id, .. } if *user_id == fan)
            })
            .count();
        assert_eq!(notices, 1);
        h.assert_consistent(book).await;
    }
}
