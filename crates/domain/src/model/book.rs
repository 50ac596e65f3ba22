//! Book inventory counts.

use common::BookId;
use serde::{Deserialize, Serialize};

use crate::commands::{BookUpdate, NewBook};
use crate::error::LendingError;

/// A catalogued book and its copy counts.
///
/// `available_copies` never exceeds `total_copies`; between operations it
/// equals `total_copies` minus the number of active loans on the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub total_copies: u32,
    pub available_copies: u32,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
}

impl Book {
    /// Creates a book with every copy on the shelf.
    pub fn new(title: impl Into<String>, author: impl Into<String>, total_copies: u32) -> Self {
        Self {
            id: BookId::new(),
            title: title.into(),
            author: author.into(),
            total_copies,
            available_copies: total_copies,
            isbn: None,
            description: None,
            genre: None,
        }
    }

    /// Creates a catalog entry from validated input.
    pub fn catalog(new_book: NewBook) -> Result<Self, LendingError> {
        let title = required(new_book.title, "title")?;
        let mut book = Self::new(title, new_book.author.trim(), new_book.total_copies);
        book.isbn = optional(new_book.isbn);
        book.description = optional(new_book.description);
        book.genre = optional(new_book.genre);
        Ok(book)
    }

    /// Replaces the catalog details and resizes against the active loans.
    ///
    /// Nothing changes when the update is rejected.
    pub fn apply(&mut self, update: BookUpdate, active_loans: u32) -> Result<(), LendingError> {
        let title = required(update.title, "title")?;
        self.resize(update.total_copies, active_loans)?;
        self.title = title;
        self.author = update.author.trim().to_string();
        self.isbn = optional(update.isbn);
        self.description = optional(update.description);
        self.genre = optional(update.genre);
        Ok(())
    }

    /// Returns true if at least one copy is on the shelf.
    pub fn has_available_copy(&self) -> bool {
        self.available_copies >= 1
    }

    /// Number of copies currently out on loan according to the counters.
    pub fn copies_on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }

    /// Takes one copy off the shelf.
    pub fn reserve_copy(&mut self) -> Result<(), LendingError> {
        if !self.has_available_copy() {
            return Err(LendingError::NoCopiesAvailable(self.id));
        }
        self.available_copies -= 1;
        Ok(())
    }

    /// Puts one copy back on the shelf.
    ///
    /// Fails instead of clamping when every copy is already on the shelf.
    pub fn release_copy(&mut self) -> Result<(), LendingError> {
        if self.available_copies >= self.total_copies {
            return Err(LendingError::InventoryInvariant {
                book_id: self.id,
                available: self.available_copies,
                total: self.total_copies,
            });
        }
        self.available_copies += 1;
        Ok(())
    }

    /// Changes the total copy count given the number of active loans.
    pub fn resize(&mut self, total_copies: u32, active_loans: u32) -> Result<(), LendingError> {
        if total_copies < active_loans {
            return Err(LendingError::Validation(format!(
                "total copies ({total_copies}) cannot be less than active borrows ({active_loans})"
            )));
        }
        self.total_copies = total_copies;
        self.available_copies = total_copies - active_loans;
        Ok(())
    }
}

fn required(value: String, field: &str) -> Result<String, LendingError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LendingError::Validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

/// Blank strings are stored as absent.
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
