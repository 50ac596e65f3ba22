use chrono::{DateTime, Utc};
use common::{BookId, UserId, WishlistId};
use serde::{Deserialize, Serialize};

/// A user's interest in a book, used for availability notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub id: WishlistId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub added_at: DateTime<Utc>,
    /// True once a `BookAvailable` notification fired for this entry.
    pub is_notified: bool,
}

impl WishlistEntry {
    pub fn new(user_id: UserId, book_id: BookId, added_at: DateTime<Utc>) -> Self {
        Self {
            id: WishlistId::new(),
            user_id,
            book_id,
            added_at,
            is_notified: false,
        }
    }
}
