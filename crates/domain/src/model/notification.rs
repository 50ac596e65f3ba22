//! Persisted user notifications.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{BookId, NotificationId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    BorrowRequestApproved,
    BorrowRequestRejected,
    ReturnRequestApproved,
    ReturnRequestRejected,
    BookAvailable,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BorrowRequestApproved => "BorrowRequestApproved",
            NotificationKind::BorrowRequestRejected => "BorrowRequestRejected",
            NotificationKind::ReturnRequestApproved => "ReturnRequestApproved",
            NotificationKind::ReturnRequestRejected => "ReturnRequestRejected",
            NotificationKind::BookAvailable => "BookAvailable",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BorrowRequestApproved" => Ok(NotificationKind::BorrowRequestApproved),
            "BorrowRequestRejected" => Ok(NotificationKind::BorrowRequestRejected),
            "ReturnRequestApproved" => Ok(NotificationKind::ReturnRequestApproved),
            "ReturnRequestRejected" => Ok(NotificationKind::ReturnRequestRejected),
            "BookAvailable" => Ok(NotificationKind::BookAvailable),
            other => Err(StoreError::Corrupt(format!(
                "unknown notification kind '{other}'"
            ))),
        }
    }
}

/// A notification stored for a user.
///
/// At most one exists per `(user_id, related_entity_id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// The request, or the book for availability notices.
    pub related_entity_id: Uuid,
    pub related_book_id: Option<BookId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        related_entity_id: Uuid,
        related_book_id: Option<BookId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            related_entity_id,
            related_book_id,
            is_read: false,
            created_at,
        }
    }
}
