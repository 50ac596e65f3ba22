//! Account administration by staff: blocking and soft deletion.

use std::time::Instant;

use common::UserId;
use domain::{LendingError, LendingStore, Role, User, UserDirectory};

use crate::clock::Clock;
use crate::engine::{LifecycleEngine, staff};
use crate::publisher::EventPublisher;
use crate::unit_of_work::{Outcome, settle};

/// What an administrative action does to the target account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountChange {
    Block,
    Unblock,
    SoftDelete,
}

impl AccountChange {
    fn operation(self) -> &'static str {
        match self {
            AccountChange::Block => "block_user",
            AccountChange::Unblock => "unblock_user",
            AccountChange::SoftDelete => "soft_delete_user",
        }
    }

    fn apply(self, user: &mut User) {
        match self {
            AccountChange::Block => user.is_blocked = true,
            AccountChange::Unblock => user.is_blocked = false,
            AccountChange::SoftDelete => user.is_deleted = true,
        }
    }
}

impl<S, P, C> LifecycleEngine<S, P, C>
where
    S: LendingStore,
    P: EventPublisher,
    C: Clock,
{
    /// Blocks a user from opening requests.
    ///
    /// Librarians may block students; admins may block anyone but themselves.
    #[tracing::instrument(skip(self))]
    pub async fn block_user(
        &self,
        actor_id: UserId,
        user_id: UserId,
    ) -> Result<User, LendingError> {
        self.change_account(actor_id, user_id, AccountChange::Block).await
    }

    /// Lifts a block. The same role rules as [`Self::block_user`] apply.
    #[tracing::instrument(skip(self))]
    pub async fn unblock_user(
        &self,
        actor_id: UserId,
        user_id: UserId,
    ) -> Result<User, LendingError> {
        self.change_account(actor_id, user_id, AccountChange::Unblock).await
    }

    /// Marks a user as deleted. Admins only.
    ///
    /// Deleted users are treated as unknown by every other operation. Their
    /// loans and requests stay on record.
    #[tracing::instrument(skip(self))]
    pub async fn soft_delete_user(
        &self,
        actor_id: UserId,
        user_id: UserId,
    ) -> Result<User, LendingError> {
        self.change_account(actor_id, user_id, AccountChange::SoftDelete).await
    }

    /// Looks up a user that has not been deleted.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, LendingError> {
        let mut uow = self.store.begin().await?;
        let result = uow
            .find_user(user_id)
            .await
            .map_err(LendingError::from)
            .and_then(|user| {
                user.filter(|u| !u.is_deleted)
                    .ok_or_else(|| LendingError::not_found("User", user_id))
            })
            .map(Outcome::quiet);
        Ok(settle(uow, result).await?.value)
    }

    async fn change_account(
        &self,
        actor_id: UserId,
        user_id: UserId,
        change: AccountChange,
    ) -> Result<User, LendingError> {
        let started = Instant::now();
        let result: Result<Outcome<User>, LendingError> = async {
            let mut uow = self.store.begin().await?;
            let result: Result<Outcome<User>, LendingError> = async {
                let actor = staff(&mut uow, actor_id).await?;
                if actor_id == user_id {
                    return Err(LendingError::Validation(format!(
                        "user {actor_id} cannot {} their own account",
                        change.operation().replace('_', " ")
                    )));
                }

                let mut user = match uow.lock_user(user_id).await? {
                    Some(user) if !user.is_deleted => user,
                    _ => return Err(LendingError::not_found("User", user_id)),
                };
                ensure_permitted(&actor, &user, change)?;

                change.apply(&mut user);
                uow.update_user(&user).await?;
                Ok(Outcome::quiet(user))
            }
            .await;
            settle(uow, result).await
        }
        .await;
        let user = self.finish(change.operation(), started, result).await?;

        metrics::counter!("lending_account_changes_total", "operation" => change.operation())
            .increment(1);
        tracing::info!(
            %user_id,
            blocked = user.is_blocked,
            deleted = user.is_deleted,
            "account updated"
        );
        Ok(user)
    }
}

fn ensure_permitted(
    actor: &User,
    target: &User,
    change: AccountChange,
) -> Result<(), LendingError> {
    let allowed = match change {
        AccountChange::SoftDelete => actor.role == Role::Admin,
        AccountChange::Block | AccountChange::Unblock => {
            actor.role == Role::Admin || target.role == Role::Student
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(LendingError::Unauthorized(format!(
            "user {} ({}) cannot {} user {} ({})",
            actor.id,
            actor.role,
            change.operation().replace('_', " "),
            target.id,
            target.role
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User::new("Someone", None, role)
    }

    #[test]
    fn librarians_manage_students_only() {
        let librarian = user(Role::Librarian);

        assert!(ensure_permitted(&librarian, &user(Role::Student), AccountChange::Block).is_ok());
        assert!(
            ensure_permitted(&librarian, &user(Role::Librarian), AccountChange::Unblock).is_err()
        );
        assert!(
            ensure_permitted(&librarian, &user(Role::Student), AccountChange::SoftDelete).is_err()
        );
    }

    #[test]
    fn admins_manage_everyone() {
        let admin = user(Role::Admin);
        for role in [Role::Student, Role::Librarian, Role::Admin] {
            for change in [
                AccountChange::Block,
                AccountChange::Unblock,
                AccountChange::SoftDelete,
            ] {
                assert!(ensure_permitted(&admin, &user(role), change).is_ok());
            }
        }
    }

    #[test]
    fn changes_touch_one_flag() {
        let mut target = user(Role::Student);
        AccountChange::Block.apply(&mut target);
        assert!(target.is_blocked && !target.is_deleted);
        AccountChange::Unblock.apply(&mut target);
        assert!(!target.is_blocked);
        AccountChange::SoftDelete.apply(&mut target);
        assert!(target.is_deleted);
    }
}
