use std::time::Duration;

use async_trait::async_trait;
use common::{
    BookId, BorrowRequestId, NotificationId, ReturnRequestId, TransactionId, UserId, WishlistId,
};
use domain::{
    Book, BookRepository, BorrowRequest, BorrowRequestQuery, BorrowTransaction, LendingStore,
    Notification, NotificationKind, NotificationQuery, NotificationRepository, RequestStore, ReturnRequest,
    ReturnRequestQuery, StoreError, StoreResult, TransactionQuery, TransactionStore, UnitOfWork,
    User, UserDirectory, WishlistEntry, WishlistRepository,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, full_name, email, role, is_blocked, is_deleted";
const BOOK_COLUMNS: &str =
    "id, title, author, total_copies, available_copies, isbn, description, genre";
const BORROW_REQUEST_COLUMNS: &str =
    "id, user_id, book_id, requested_at, status, due_date, approver_id, decided_at, remarks";
const TRANSACTION_COLUMNS: &str = "id, borrow_request_id, user_id, book_id, borrowed_at, due_date, returned_at, penalty_cents, notes";
const RETURN_REQUEST_COLUMNS: &str = "id, transaction_id, user_id, book_id, status, return_date, processed_by, processed_at, remarks";
const WISHLIST_COLUMNS: &str = "id, user_id, book_id, added_at, is_notified";
const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, related_entity_id, related_book_id, is_read, created_at";

const BORROW_REQUEST_FILTER: &str = "($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR user_id = $2) AND ($3::uuid IS NULL OR book_id = $3)";
const RETURN_REQUEST_FILTER: &str = "($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR user_id = $2) AND ($3::uuid IS NULL OR transaction_id = $3)";
const TRANSACTION_FILTER: &str = "($1::uuid IS NULL OR user_id = $1) AND ($2::uuid IS NULL OR book_id = $2) AND (NOT $3 OR returned_at IS NULL)";

/// PostgreSQL-backed lending store.
#[derive(Clone)]
pub struct PostgresLendingStore {
    pool: PgPool,
}

impl PostgresLendingStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool. `acquire_timeout` bounds how long a unit of work
    /// waits for a connection.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LendingStore for PostgresLendingStore {
    type Uow = PostgresUnitOfWork;

    async fn begin(&self) -> StoreResult<PostgresUnitOfWork> {
        let tx = self.pool.begin().await?;
        Ok(PostgresUnitOfWork { tx })
    }
}

/// Unit of work backed by a database transaction.
///
/// `lock_*` reads use `SELECT ... FOR UPDATE`. Dropping the unit rolls the
/// transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

/// Maps a write error, surfacing unique violations by constraint name.
fn write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
        && let Some(constraint) = db_err.constraint()
    {
        return StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        };
    }
    StoreError::Database(e)
}

fn ensure_updated(rows: u64, entity: &str, id: impl std::fmt::Display) -> StoreResult<()> {
    if rows == 0 {
        return Err(StoreError::Corrupt(format!("{entity} {id} does not exist")));
    }
    Ok(())
}

fn to_db_count(value: u32, field: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {value}")))
}

fn from_db_count(value: i64, field: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {value}")))
}

fn row_to_user(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        role: row.try_get::<String, _>("role")?.parse()?,
        is_blocked: row.try_get("is_blocked")?,
        is_deleted: row.try_get("is_deleted")?,
    })
}

fn row_to_book(row: &PgRow) -> StoreResult<Book> {
    Ok(Book {
        id: BookId::from_uuid(row.try_get("id")?),
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        total_copies: from_db_count(row.try_get::<i32, _>("total_copies")?.into(), "total_copies")?,
        available_copies: from_db_count(
            row.try_get::<i32, _>("available_copies")?.into(),
            "available_copies",
        )?,
        isbn: row.try_get("isbn")?,
        description: row.try_get("description")?,
        genre: row.try_get("genre")?,
    })
}

fn row_to_borrow_request(row: &PgRow) -> StoreResult<BorrowRequest> {
    Ok(BorrowRequest {
        id: BorrowRequestId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        book_id: BookId::from_uuid(row.try_get("book_id")?),
        requested_at: row.try_get("requested_at")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        due_date: row.try_get("due_date")?,
        approver_id: row
            .try_get::<Option<Uuid>, _>("approver_id")?
            .map(UserId::from_uuid),
        decided_at: row.try_get("decided_at")?,
        remarks: row.try_get("remarks")?,
    })
}

fn row_to_transaction(row: &PgRow) -> StoreResult<BorrowTransaction> {
    Ok(BorrowTransaction {
        id: TransactionId::from_uuid(row.try_get("id")?),
        borrow_request_id: BorrowRequestId::from_uuid(row.try_get("borrow_request_id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        book_id: BookId::from_uuid(row.try_get("book_id")?),
        borrowed_at: row.try_get("borrowed_at")?,
        due_date: row.try_get("due_date")?,
        returned_at: row.try_get("returned_at")?,
        penalty_cents: row.try_get("penalty_cents")?,
        notes: row.try_get("notes")?,
    })
}

fn row_to_return_request(row: &PgRow) -> StoreResult<ReturnRequest> {
    Ok(ReturnRequest {
        id: ReturnRequestId::from_uuid(row.try_get("id")?),
        transaction_id: TransactionId::from_uuid(row.try_get("transaction_id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        book_id: BookId::from_uuid(row.try_get("book_id")?),
        status: row.try_get::<String, _>("status")?.parse()?,
        return_date: row.try_get("return_date")?,
        processed_by: row
            .try_get::<Option<Uuid>, _>("processed_by")?
            .map(UserId::from_uuid),
        processed_at: row.try_get("processed_at")?,
        remarks: row.try_get("remarks")?,
    })
}

fn row_to_wishlist_entry(row: &PgRow) -> StoreResult<WishlistEntry> {
    Ok(WishlistEntry {
        id: WishlistId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        book_id: BookId::from_uuid(row.try_get("book_id")?),
        added_at: row.try_get("added_at")?,
        is_notified: row.try_get("is_notified")?,
    })
}

fn row_to_notification(row: &PgRow) -> StoreResult<Notification> {
    Ok(Notification {
        id: NotificationId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        kind: row.try_get::<String, _>("kind")?.parse()?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        related_entity_id: row.try_get("related_entity_id")?,
        related_book_id: row
            .try_get::<Option<Uuid>, _>("related_book_id")?
            .map(BookId::from_uuid),
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

impl PostgresUnitOfWork {
    async fn fetch_user(&mut self, id: UserId, lock: bool) -> StoreResult<Option<User>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1{suffix}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn fetch_book(&mut self, id: BookId, lock: bool) -> StoreResult<Option<Book>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1{suffix}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_book).transpose()
    }

    async fn fetch_borrow_request(
        &mut self,
        id: BorrowRequestId,
        lock: bool,
    ) -> StoreResult<Option<BorrowRequest>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let sql =
            format!("SELECT {BORROW_REQUEST_COLUMNS} FROM borrow_requests WHERE id = $1{suffix}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_borrow_request).transpose()
    }

    async fn fetch_return_request(
        &mut self,
        id: ReturnRequestId,
        lock: bool,
    ) -> StoreResult<Option<ReturnRequest>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let sql =
            format!("SELECT {RETURN_REQUEST_COLUMNS} FROM return_requests WHERE id = $1{suffix}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_return_request).transpose()
    }

    async fn fetch_transaction(
        &mut self,
        id: TransactionId,
        lock: bool,
    ) -> StoreResult<Option<BorrowTransaction>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let sql =
            format!("SELECT {TRANSACTION_COLUMNS} FROM borrow_transactions WHERE id = $1{suffix}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_transaction).transpose()
    }
}

#[async_trait]
impl UserDirectory for PostgresUnitOfWork {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        self.fetch_user(id, false).await
    }

    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        self.fetch_user(id, true).await
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, email, role, is_blocked, is_deleted)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.is_blocked)
        .bind(user.is_deleted)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET full_name = $2, email = $3, role = $4, is_blocked = $5, is_deleted = $6
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.is_blocked)
        .bind(user.is_deleted)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        ensure_updated(result.rows_affected(), "user", user.id)
    }
}

#[async_trait]
impl BookRepository for PostgresUnitOfWork {
    async fn find_book(&mut self, id: BookId) -> StoreResult<Option<Book>> {
        self.fetch_book(id, false).await
    }

    async fn lock_book(&mut self, id: BookId) -> StoreResult<Option<Book>> {
        self.fetch_book(id, true).await
    }

    async fn list_books(&mut self) -> StoreResult<Vec<Book>> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY title ASC");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        rows.iter().map(row_to_book).collect()
    }

    async fn list_genres(&mut self) -> StoreResult<Vec<String>> {
        let genres = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT genre FROM books WHERE genre IS NOT NULL ORDER BY genre ASC",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(genres)
    }

    async fn insert_book(&mut self, book: &Book) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO books
                (id, title, author, total_copies, available_copies, isbn, description, genre)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(book.id.as_uuid())
        .bind(&book.title)
        .bind(&book.author)
        .bind(to_db_count(book.total_copies, "total_copies")?)
        .bind(to_db_count(book.available_copies, "available_copies")?)
        .bind(&book.isbn)
        .bind(&book.description)
        .bind(&book.genre)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_book(&mut self, book: &Book) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $2, author = $3, total_copies = $4, available_copies = $5,
                isbn = $6, description = $7, genre = $8
            WHERE id = $1
            "#,
        )
        .bind(book.id.as_uuid())
        .bind(&book.title)
        .bind(&book.author)
        .bind(to_db_count(book.total_copies, "total_copies")?)
        .bind(to_db_count(book.available_copies, "available_copies")?)
        .bind(&book.isbn)
        .bind(&book.description)
        .bind(&book.genre)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        ensure_updated(result.rows_affected(), "book", book.id)
    }

    async fn delete_book(&mut self, id: BookId) -> StoreResult<()> {
        // wishlists cascade
        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RequestStore for PostgresUnitOfWork {
    async fn find_borrow_request(
        &mut self,
        id: BorrowRequestId,
    ) -> StoreResult<Option<BorrowRequest>> {
        self.fetch_borrow_request(id, false).await
    }

    async fn lock_borrow_request(
        &mut self,
        id: BorrowRequestId,
    ) -> StoreResult<Option<BorrowRequest>> {
        self.fetch_borrow_request(id, true).await
    }

    async fn insert_borrow_request(&mut self, request: &BorrowRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO borrow_requests
                (id, user_id, book_id, requested_at, status, due_date, approver_id, decided_at, remarks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.user_id.as_uuid())
        .bind(request.book_id.as_uuid())
        .bind(request.requested_at)
        .bind(request.status.as_str())
        .bind(request.due_date)
        .bind(request.approver_id.map(|id| id.as_uuid()))
        .bind(request.decided_at)
        .bind(&request.remarks)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_borrow_request(&mut self, request: &BorrowRequest) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_requests
            SET status = $2, due_date = $3, approver_id = $4, decided_at = $5, remarks = $6
            WHERE id = $1
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.status.as_str())
        .bind(request.due_date)
        .bind(request.approver_id.map(|id| id.as_uuid()))
        .bind(request.decided_at)
        .bind(&request.remarks)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        ensure_updated(result.rows_affected(), "borrow request", request.id)
    }

    async fn list_borrow_requests(
        &mut self,
        query: &BorrowRequestQuery,
    ) -> StoreResult<Vec<BorrowRequest>> {
        let sql = format!(
            "SELECT {BORROW_REQUEST_COLUMNS} FROM borrow_requests WHERE {BORROW_REQUEST_FILTER} ORDER BY requested_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.user_id.map(|id| id.as_uuid()))
            .bind(query.book_id.map(|id| id.as_uuid()))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_borrow_request).collect()
    }

    async fn count_borrow_requests(&mut self, query: &BorrowRequestQuery) -> StoreResult<u32> {
        let sql = format!("SELECT COUNT(*) FROM borrow_requests WHERE {BORROW_REQUEST_FILTER}");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.user_id.map(|id| id.as_uuid()))
            .bind(query.book_id.map(|id| id.as_uuid()))
            .fetch_one(&mut *self.tx)
            .await?;
        from_db_count(count, "borrow request count")
    }

    async fn find_return_request(
        &mut self,
        id: ReturnRequestId,
    ) -> StoreResult<Option<ReturnRequest>> {
        self.fetch_return_request(id, false).await
    }

    async fn lock_return_request(
        &mut self,
        id: ReturnRequestId,
    ) -> StoreResult<Option<ReturnRequest>> {
        self.fetch_return_request(id, true).await
    }

    async fn insert_return_request(&mut self, request: &ReturnRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO return_requests
                (id, transaction_id, user_id, book_id, status, return_date, processed_by, processed_at, remarks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.transaction_id.as_uuid())
        .bind(request.user_id.as_uuid())
        .bind(request.book_id.as_uuid())
        .bind(request.status.as_str())
        .bind(request.return_date)
        .bind(request.processed_by.map(|id| id.as_uuid()))
        .bind(request.processed_at)
        .bind(&request.remarks)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_return_request(&mut self, request: &ReturnRequest) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE return_requests
            SET status = $2, processed_by = $3, processed_at = $4, remarks = $5
            WHERE id = $1
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.status.as_str())
        .bind(request.processed_by.map(|id| id.as_uuid()))
        .bind(request.processed_at)
        .bind(&request.remarks)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        ensure_updated(result.rows_affected(), "return request", request.id)
    }

    async fn list_return_requests(
        &mut self,
        query: &ReturnRequestQuery,
    ) -> StoreResult<Vec<ReturnRequest>> {
        let sql = format!(
            "SELECT {RETURN_REQUEST_COLUMNS} FROM return_requests WHERE {RETURN_REQUEST_FILTER} ORDER BY return_date DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.user_id.map(|id| id.as_uuid()))
            .bind(query.transaction_id.map(|id| id.as_uuid()))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_return_request).collect()
    }

    async fn count_return_requests(&mut self, query: &ReturnRequestQuery) -> StoreResult<u32> {
        let sql = format!("SELECT COUNT(*) FROM return_requests WHERE {RETURN_REQUEST_FILTER}");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.user_id.map(|id| id.as_uuid()))
            .bind(query.transaction_id.map(|id| id.as_uuid()))
            .fetch_one(&mut *self.tx)
            .await?;
        from_db_count(count, "return request count")
    }
}

#[async_trait]
impl TransactionStore for PostgresUnitOfWork {
    async fn find_transaction(
        &mut self,
        id: TransactionId,
    ) -> StoreResult<Option<BorrowTransaction>> {
        self.fetch_transaction(id, false).await
    }

    async fn lock_transaction(
        &mut self,
        id: TransactionId,
    ) -> StoreResult<Option<BorrowTransaction>> {
        self.fetch_transaction(id, true).await
    }

    async fn insert_transaction(&mut self, transaction: &BorrowTransaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO borrow_transactions
                (id, borrow_request_id, user_id, book_id, borrowed_at, due_date, returned_at, penalty_cents, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.borrow_request_id.as_uuid())
        .bind(transaction.user_id.as_uuid())
        .bind(transaction.book_id.as_uuid())
        .bind(transaction.borrowed_at)
        .bind(transaction.due_date)
        .bind(transaction.returned_at)
        .bind(transaction.penalty_cents)
        .bind(&transaction.notes)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_transaction(&mut self, transaction: &BorrowTransaction) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_transactions
            SET due_date = $2, returned_at = $3, penalty_cents = $4, notes = $5
            WHERE id = $1
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.due_date)
        .bind(transaction.returned_at)
        .bind(transaction.penalty_cents)
        .bind(&transaction.notes)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        ensure_updated(result.rows_affected(), "transaction", transaction.id)
    }

    async fn list_transactions(
        &mut self,
        query: &TransactionQuery,
    ) -> StoreResult<Vec<BorrowTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM borrow_transactions WHERE {TRANSACTION_FILTER} ORDER BY borrowed_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(query.user_id.map(|id| id.as_uuid()))
            .bind(query.book_id.map(|id| id.as_uuid()))
            .bind(query.active_only)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_transaction).collect()
    }

    async fn count_transactions(&mut self, query: &TransactionQuery) -> StoreResult<u32> {
        let sql = format!("SELECT COUNT(*) FROM borrow_transactions WHERE {TRANSACTION_FILTER}");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(query.user_id.map(|id| id.as_uuid()))
            .bind(query.book_id.map(|id| id.as_uuid()))
            .bind(query.active_only)
            .fetch_one(&mut *self.tx)
            .await?;
        from_db_count(count, "transaction count")
    }
}

#[async_trait]
impl WishlistRepository for PostgresUnitOfWork {
    async fn find_wishlist_entry(&mut self, id: WishlistId) -> StoreResult<Option<WishlistEntry>> {
        let sql = format!("SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_wishlist_entry).transpose()
    }

    async fn find_wishlist_entry_for(
        &mut self,
        user_id: UserId,
        book_id: BookId,
    ) -> StoreResult<Option<WishlistEntry>> {
        let sql =
            format!("SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE user_id = $1 AND book_id = $2");
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(book_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_wishlist_entry).transpose()
    }

    async fn list_wishlist(&mut self, user_id: UserId) -> StoreResult<Vec<WishlistEntry>> {
        let sql = format!(
            "SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE user_id = $1 ORDER BY added_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_wishlist_entry).collect()
    }

    async fn lock_unnotified_wishlist(
        &mut self,
        book_id: BookId,
    ) -> StoreResult<Vec<WishlistEntry>> {
        let sql = format!(
            "SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE book_id = $1 AND NOT is_notified ORDER BY added_at ASC FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(book_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_wishlist_entry).collect()
    }

    async fn insert_wishlist_entry(&mut self, entry: &WishlistEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wishlists (id, user_id, book_id, added_at, is_notified)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.user_id.as_uuid())
        .bind(entry.book_id.as_uuid())
        .bind(entry.added_at)
        .bind(entry.is_notified)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_wishlist_entry(&mut self, entry: &WishlistEntry) -> StoreResult<()> {
        let result = sqlx::query("UPDATE wishlists SET is_notified = $2 WHERE id = $1")
            .bind(entry.id.as_uuid())
            .bind(entry.is_notified)
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;
        ensure_updated(result.rows_affected(), "wishlist entry", entry.id)
    }

    async fn delete_wishlist_entry(&mut self, id: WishlistId) -> StoreResult<()> {
        sqlx::query("DELETE FROM wishlists WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for PostgresUnitOfWork {
    async fn notification_exists(
        &mut self,
        user_id: UserId,
        related_entity_id: Uuid,
        kind: NotificationKind,
    ) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM notifications
                WHERE user_id = $1 AND related_entity_id = $2 AND kind = $3
            )
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(related_entity_id)
        .bind(kind.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn find_notification(
        &mut self,
        id: NotificationId,
    ) -> StoreResult<Option<Notification>> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_notification).transpose()
    }

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, kind, title, message, related_entity_id, related_book_id, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(notification.id.as_uuid())
        .bind(notification.user_id.as_uuid())
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.related_entity_id)
        .bind(notification.related_book_id.map(|id| id.as_uuid()))
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        let result = sqlx::query("UPDATE notifications SET is_read = $2 WHERE id = $1")
            .bind(notification.id.as_uuid())
            .bind(notification.is_read)
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;
        ensure_updated(result.rows_affected(), "notification", notification.id)
    }

    async fn list_notifications(
        &mut self,
        user_id: UserId,
        query: &NotificationQuery,
    ) -> StoreResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 AND (NOT $2 OR NOT is_read) \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        );
        let offset = i64::try_from(query.offset())
            .map_err(|_| StoreError::Corrupt(format!("page offset out of range: {}", query.page)))?;
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(query.unread_only)
            .bind(i64::from(query.page_size))
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_notification).collect()
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(write_error)
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
