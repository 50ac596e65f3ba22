//! Commit and rollback handling shared by every engine operation.

use domain::{LendingError, LendingEvent, StoreError, UnitOfWork};

/// The value of an operation plus the events to publish once it commits.
#[derive(Debug)]
pub(crate) struct Outcome<T> {
    pub value: T,
    pub events: Vec<LendingEvent>,
}

impl<T> Outcome<T> {
    pub fn quiet(value: T) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    pub fn with_event(value: T, event: LendingEvent) -> Self {
        Self {
            value,
            events: vec![event],
        }
    }
}

/// Commits on success and rolls back on failure.
///
/// The original error is returned when the rollback itself fails.
pub(crate) async fn settle<U, T>(
    uow: U,
    result: Result<Outcome<T>, LendingError>,
) -> Result<Outcome<T>, LendingError>
where
    U: UnitOfWork,
{
    match result {
        Ok(outcome) => {
            uow.commit().await.map_err(|e| unique_to_conflict(e, "commit"))?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}

/// Maps a unique-constraint violation to `Conflict`, other errors to `Store`.
pub(crate) fn unique_to_conflict(err: StoreError, what: &str) -> LendingError {
    match err {
        StoreError::UniqueViolation { constraint } => {
            LendingError::Conflict(format!("{what} violates {constraint}"))
        }
        other => LendingError::Store(other),
    }
}
