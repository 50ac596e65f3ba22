//! Shared identifier types for the lending workspace.

mod types;

pub use types::{
    BookId, BorrowRequestId, NotificationId, ReturnRequestId, TransactionId, UserId, WishlistId,
};
