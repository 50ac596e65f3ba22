//! Filters for the read side of the stores.

use common::{BookId, TransactionId, UserId};

use crate::model::{
    BorrowRequest, BorrowStatus, BorrowTransaction, Notification, ReturnRequest, ReturnStatus,
};

/// Notifications per page when the caller does not choose.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Largest page a caller may ask for.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filter for borrow requests. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorrowRequestQuery {
    pub status: Option<BorrowStatus>,
    pub user_id: Option<UserId>,
    pub book_id: Option<BookId>,
}

impl BorrowRequestQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by status.
    pub fn status(mut self, status: BorrowStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by requesting user.
    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Filters by requested book.
    pub fn book(mut self, book_id: BookId) -> Self {
        self.book_id = Some(book_id);
        self
    }

    /// Returns true if the request passes every set filter.
    pub fn matches(&self, request: &BorrowRequest) -> bool {
        self.status.is_none_or(|s| request.status == s)
            && self.user_id.is_none_or(|u| request.user_id == u)
            && self.book_id.is_none_or(|b| request.book_id == b)
    }
}

/// Filter for return requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnRequestQuery {
    pub status: Option<ReturnStatus>,
    pub user_id: Option<UserId>,
    pub transaction_id: Option<TransactionId>,
}

impl ReturnRequestQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: ReturnStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn matches(&self, request: &ReturnRequest) -> bool {
        self.status.is_none_or(|s| request.status == s)
            && self.user_id.is_none_or(|u| request.user_id == u)
            && self.transaction_id.is_none_or(|t| request.transaction_id == t)
    }
}

/// Filter for borrow transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    pub user_id: Option<UserId>,
    pub book_id: Option<BookId>,
    /// Only loans that have not been returned.
    pub active_only: bool,
}

impl TransactionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn book(mut self, book_id: BookId) -> Self {
        self.book_id = Some(book_id);
        self
    }

    /// Restricts the query to active loans.
    pub fn active(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn matches(&self, transaction: &BorrowTransaction) -> bool {
        (!self.active_only || transaction.is_active())
            && self.user_id.is_none_or(|u| transaction.user_id == u)
            && self.book_id.is_none_or(|b| transaction.book_id == b)
    }
}

/// One page of a user's notifications, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationQuery {
    pub unread_only: bool,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            unread_only: false,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl NotificationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the query to unread notifications.
    pub fn unread(mut self) -> Self {
        self.unread_only = true;
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// True for a page number of at least 1 and a size within `1..=MAX_PAGE_SIZE`.
    pub fn is_valid(&self) -> bool {
        self.page >= 1 && (1..=MAX_PAGE_SIZE).contains(&self.page_size)
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        !self.unread_only || !notification.is_read
    }
}
