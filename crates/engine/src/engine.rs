//! The lifecycle engine and its shared helpers.

use std::time::Instant;

use common::UserId;
use domain::{LendingError, LendingStore, User, UserDirectory};

use crate::clock::{Clock, SystemClock};
use crate::policy::LendingPolicy;
use crate::publisher::EventPublisher;
use crate::unit_of_work::Outcome;

/// Executes every borrow, return, catalog, and wishlist operation.
///
/// Each mutating operation runs in one unit of work obtained from the store.
/// Events gathered along the way are handed to the publisher only after the
/// unit of work commits.
pub struct LifecycleEngine<S, P, C = SystemClock>
where
    S: LendingStore,
    P: EventPublisher,
    C: Clock,
{
    pub(crate) store: S,
    pub(crate) publisher: P,
    pub(crate) clock: C,
    pub(crate) policy: LendingPolicy,
}

impl<S, P> LifecycleEngine<S, P, SystemClock>
where
    S: LendingStore,
    P: EventPublisher,
{
    /// Creates an engine with the wall clock and the default policy.
    pub fn new(store: S, publisher: P) -> Self {
        Self {
            store,
            publisher,
            clock: SystemClock,
            policy: LendingPolicy::default(),
        }
    }
}

impl<S, P, C> LifecycleEngine<S, P, C>
where
    S: LendingStore,
    P: EventPublisher,
    C: Clock,
{
    /// Replaces the clock.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> LifecycleEngine<S, P, C2> {
        LifecycleEngine {
            store: self.store,
            publisher: self.publisher,
            clock,
            policy: self.policy,
        }
    }

    /// Replaces the lending policy.
    pub fn with_policy(mut self, policy: LendingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    /// Records the outcome, publishes committed events, and unwraps the value.
    pub(crate) async fn finish<T>(
        &self,
        operation: &'static str,
        started: Instant,
        result: Result<Outcome<T>, LendingError>,
    ) -> Result<T, LendingError> {
        observe(operation, started, &result);
        let outcome = result?;
        for event in outcome.events {
            self.publisher.publish(event).await;
        }
        Ok(outcome.value)
    }
}

/// Loads a user allowed to open requests.
pub(crate) async fn requester<U: UserDirectory>(
    uow: &mut U,
    user_id: UserId,
    lock: bool,
) -> Result<User, LendingError> {
    let user = if lock {
        uow.lock_user(user_id).await?
    } else {
        uow.find_user(user_id).await?
    };
    match user {
        Some(user) if user.can_request() => Ok(user),
        Some(user) if user.is_deleted => Err(unknown_user(user_id)),
        Some(user) => Err(LendingError::Unauthorized(format!(
            "user {user_id} ({}, blocked: {}) cannot open requests",
            user.role, user.is_blocked
        ))),
        None => Err(unknown_user(user_id)),
    }
}

/// Loads a librarian or admin allowed to process requests.
pub(crate) async fn staff<U: UserDirectory>(
    uow: &mut U,
    user_id: UserId,
) -> Result<User, LendingError> {
    match uow.find_user(user_id).await? {
        Some(user) if user.can_process() => Ok(user),
        Some(user) if user.is_deleted => Err(unknown_user(user_id)),
        Some(user) => Err(LendingError::Unauthorized(format!(
            "user {user_id} ({}) cannot process requests",
            user.role
        ))),
        None => Err(unknown_user(user_id)),
    }
}

fn unknown_user(user_id: UserId) -> LendingError {
    LendingError::Unauthorized(format!("user {user_id} not found"))
}

fn observe<T>(
    operation: &'static str,
    started: Instant,
    result: &Result<T, LendingError>,
) {
    metrics::histogram!("lending_operation_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = result {
        let kind = e.kind().as_str();
        metrics::counter!("lending_operation_failures_total", "operation" => operation, "kind" => kind)
            .increment(1);
        tracing::info!(operation, kind, error = %e, "operation refused");
    }
}
