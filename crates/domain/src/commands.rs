//! Input payloads for operations that take more than ids.

use common::{BookId, TransactionId};
use serde::{Deserialize, Serialize};

/// A book to add to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub total_copies: u32,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

impl NewBook {
    pub fn new(title: impl Into<String>, author: impl Into<String>, total_copies: u32) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            total_copies,
            isbn: None,
            description: None,
            genre: None,
        }
    }

    pub fn isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }
}

/// Replacement catalog details for an existing book.
///
/// Every field overwrites the stored value; `None` clears an optional one.
/// Availability is recomputed from `total_copies` and the active loans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub title: String,
    pub author: String,
    pub total_copies: u32,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

impl BookUpdate {
    pub fn new(title: impl Into<String>, author: impl Into<String>, total_copies: u32) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            total_copies,
            isbn: None,
            description: None,
            genre: None,
        }
    }

    pub fn isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }
}

/// A borrower's return request. `book_id` must match the loan's book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReturnRequest {
    pub transaction_id: TransactionId,
    pub book_id: BookId,
}
