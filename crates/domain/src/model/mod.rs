//! Entities of the lending workflow.

mod book;
mod borrow_request;
mod notification;
mod return_request;
mod status;
mod transaction;
mod user;
mod wishlist;

pub use book::Book;
pub use borrow_request::BorrowRequest;
pub use notification::{Notification, NotificationKind};
pub use return_request::ReturnRequest;
pub use status::{BorrowStatus, ReturnStatus};
pub use transaction::{BorrowTransaction, ISSUED_ON_APPROVAL};
pub use user::{Role, User};
pub use wishlist::WishlistEntry;
