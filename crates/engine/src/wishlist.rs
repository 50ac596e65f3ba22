//! Wishlist operations.

use std::time::Instant;

use common::{BookId, UserId, WishlistId};
use domain::{
    BookRepository, LendingError, LendingEvent, LendingStore, UserDirectory, WishlistEntry,
    WishlistRepository,
};

use crate::clock::Clock;
use crate::engine::LifecycleEngine;
use crate::publisher::EventPublisher;
use crate::unit_of_work::{Outcome, settle, unique_to_conflict};

impl<S, P, C> LifecycleEngine<S, P, C>
where
    S: LendingStore,
    P: EventPublisher,
    C: Clock,
{
    /// Adds a book to a user's wishlist.
    ///
    /// When a copy is already on the shelf the user is told right away and
    /// the entry is stored as notified.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_wishlist(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<WishlistEntry, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<WishlistEntry>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result: Result<Outcome<WishlistEntry>, LendingError> = async {
                match uow.find_user(user_id).await? {
                    Some(user) if !user.is_deleted => {}
                    _ => return Err(LendingError::not_found("User", user_id)),
                }
                // Book before wishlist, the same order return approval uses.
                let book = uow
                    .lock_book(book_id)
                    .await?
                    .ok_or_else(|| LendingError::not_found("Book", book_id))?;
                if uow.find_wishlist_entry_for(user_id, book_id).await?.is_some() {
                    return Err(LendingError::Conflict(format!(
                        "book {book_id} is already on the wishlist of user {user_id}"
                    )));
                }

                let mut entry = WishlistEntry::new(user_id, book_id, self.clock.now());
                let mut events = Vec::new();
                if book.has_available_copy() {
                    entry.is_notified = true;
                    events.push(LendingEvent::BookAvailable { book_id, user_id });
                }
                uow.insert_wishlist_entry(&entry)
                    .await
                    .map_err(|e| unique_to_conflict(e, "wishlist entry"))?;
                Ok(Outcome {
                    value: entry,
                    events,
                })
            }
            .await;
            settle(uow, result).await
        }
        .await;
        let entry = self.finish("add_to_wishlist", started, result).await?;

        tracing::info!(wishlist_id = %entry.id, notified = entry.is_notified, "added to wishlist");
        Ok(entry)
    }

    /// Removes one of the user's own wishlist entries.
    #[tracing::instrument(skip(self))]
    pub async fn remove_from_wishlist(
        &self,
        user_id: UserId,
        wishlist_id: WishlistId,
    ) -> Result<(), LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<()>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result: Result<Outcome<()>, LendingError> = async {
                let entry = uow
                    .find_wishlist_entry(wishlist_id)
                    .await?
                    .ok_or_else(|| LendingError::not_found("WishlistEntry", wishlist_id))?;
                if entry.user_id != user_id {
                    return Err(LendingError::Unauthorized(format!(
                        "wishlist entry {wishlist_id} does not belong to user {user_id}"
                    )));
                }
                uow.delete_wishlist_entry(wishlist_id).await?;
                Ok(Outcome::quiet(()))
            }
            .await;
            settle(uow, result).await
        }
        .await;
        self.finish("remove_from_wishlist", started, result).await
    }

    /// Lists a user's wishlist, newest first.
    pub async fn list_wishlist(&self, user_id: UserId) -> Result<Vec<WishlistEntry>, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .list_wishlist(user_id)
            .await
            .map(Outcome::quiet)
            .map_err(LendingError::from);
        Ok(settle(uow, result).await?.value)
    }
}
