//! Domain layer of the library lending system.
//!
//! This crate provides:
//! - Entities with closed status enums and transition functions
//! - Lifecycle events consumed by the notifier
//! - The lending error taxonomy
//! - Query filters and the unit-of-work store ports

pub mod commands;
pub mod error;
pub mod events;
pub mod model;
pub mod query;
pub mod store;

pub use commands::{BookUpdate, NewBook, NewReturnRequest};
pub use error::{ErrorKind, LendingError, StoreError};
pub use events::LendingEvent;
pub use model::{
    Book, BorrowRequest, BorrowStatus, BorrowTransaction, ISSUED_ON_APPROVAL, Notification,
    NotificationKind, ReturnRequest, ReturnStatus, Role, User, WishlistEntry,
};
pub use query::{BorrowRequestQuery, NotificationQuery, ReturnRequestQuery, TransactionQuery};
pub use store::{
    BookRepository, LendingStore, NotificationRepository, RequestStore, StoreResult,
    TransactionStore, UnitOfWork, UserDirectory, WishlistRepository,
};
