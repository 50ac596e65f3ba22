//! Notifier error types.

use domain::StoreError;
use thiserror::Error;

/// Errors raised while recording or delivering a notification.
///
/// These never reach the lifecycle engine; the dispatcher logs and drops them.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The referenced user, book or notification does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller does not own the notification.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller asked for an impossible page.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The email transport rejected a message.
    #[error("Email delivery failed: {0}")]
    Email(String),
}

impl NotifierError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        NotifierError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for notifier operations.
pub type Result<T> = std::result::Result<T, NotifierError>;
