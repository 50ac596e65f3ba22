//! Domain error types.

use common::{BookId, UserId};
use thiserror::Error;

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A persisted value could not be mapped back into the domain.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns true if the error is a violation of the named unique constraint.
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

/// Flat classification of a [`LendingError`].
///
/// Every variant maps to a distinct caller-visible outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidState,
    Conflict,
    QuotaExceeded,
    NoCopiesAvailable,
    Validation,
    InventoryInvariant,
    Store,
}

impl ErrorKind {
    /// Returns a stable snake_case name, used as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Conflict => "conflict",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::NoCopiesAvailable => "no_copies_available",
            ErrorKind::Validation => "validation",
            ErrorKind::InventoryInvariant => "inventory_invariant",
            ErrorKind::Store => "store",
        }
    }
}

/// Errors that can occur during lending operations.
#[derive(Debug, Error)]
pub enum LendingError {
    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The actor is missing, blocked, has the wrong role or does not own the resource.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The entity is not in the state the operation requires.
    #[error("Invalid state: cannot {action} {entity} {id} in {status} state")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: String,
        action: &'static str,
    },

    /// A duplicate pending request or active loan already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The user already holds the maximum number of active or pending borrows.
    #[error("User {user_id} has reached the borrow limit of {limit}")]
    QuotaExceeded { user_id: UserId, limit: u32 },

    /// No copy of the book is available.
    #[error("No copies available for book {0}")]
    NoCopiesAvailable(BookId),

    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Releasing a copy would push availability above the total.
    #[error(
        "Inventory invariant violated for book {book_id}: available {available} of {total} copies"
    )]
    InventoryInvariant {
        book_id: BookId,
        available: u32,
        total: u32,
    },

    /// The persistence backend failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LendingError {
    /// Creates a not-found error for the given entity.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LendingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the flat classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LendingError::NotFound { .. } => ErrorKind::NotFound,
            LendingError::Unauthorized(_) => ErrorKind::Unauthorized,
            LendingError::InvalidState { .. } => ErrorKind::InvalidState,
            LendingError::Conflict(_) => ErrorKind::Conflict,
            LendingError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            LendingError::NoCopiesAvailable(_) => ErrorKind::NoCopiesAvailable,
            LendingError::Validation(_) => ErrorKind::Validation,
            LendingError::InventoryInvariant { .. } => ErrorKind::InventoryInvariant,
            LendingError::Store(_) => ErrorKind::Store,
        }
    }
}
