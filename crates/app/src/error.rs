//! Service host error types.

use domain::{LendingError, StoreError};
use thiserror::Error;

/// Errors that stop the service from starting or shutting down cleanly.
#[derive(Debug, Error)]
pub enum AppError {
    /// Connecting to or migrating the store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A start-up check through the engine failed.
    #[error("Lending error: {0}")]
    Lending(#[from] LendingError),

    /// The log subscriber or metrics exporter could not be installed.
    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),

    /// The notifier task panicked or was cancelled.
    #[error("Notifier task failed: {0}")]
    Notifier(#[from] tokio::task::JoinError),
}
