//! Service host for the library lending system.
//!
//! Wires a store into the [`LifecycleEngine`] and runs the notifier on its
//! own task, connected by a bounded event channel.
//!
//! The engine has no transport of its own. Front ends embed
//! [`LendingService`] and call [`LendingService::engine`] from their request
//! handlers. The `lending` binary is the deployment host for that setup: it
//! applies migrations and audits the catalog at start-up, serves metrics
//! while running, then drains the notifier on shutdown.

pub mod config;
pub mod error;
pub mod telemetry;

use domain::LendingStore;
use engine::{ChannelPublisher, LifecycleEngine};
use notifier::{EmailSender, LoggingEmailSender, NotificationDispatcher, NotificationService};
use tokio::task::JoinHandle;

pub use config::{Config, LogFormat};
pub use error::AppError;

/// The engine plus the notifier task draining its events.
pub struct LendingService<S: LendingStore> {
    engine: LifecycleEngine<S, ChannelPublisher>,
    notifier: JoinHandle<u64>,
}

impl<S: LendingStore + Clone> LendingService<S> {
    /// Starts the service with emails written to the log.
    pub fn start(store: S, config: &Config) -> Self {
        Self::start_with_email(store, LoggingEmailSender, config)
    }

    /// Starts the service with the given email sender.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_with_email<E: EmailSender>(store: S, email: E, config: &Config) -> Self {
        let (publisher, events) = ChannelPublisher::channel(config.notifier_buffer);
        let engine = LifecycleEngine::new(store.clone(), publisher).with_policy(config.policy());

        let dispatcher = NotificationDispatcher::new(NotificationService::new(store, email));
        let notifier = tokio::spawn(async move { dispatcher.run(events).await });

        Self { engine, notifier }
    }

    pub fn engine(&self) -> &LifecycleEngine<S, ChannelPublisher> {
        &self.engine
    }

    /// Runs the catalog audit, logging every book whose counters drifted.
    /// Returns the number of drifted books.
    pub async fn audit_inventory(&self) -> Result<usize, AppError> {
        let drifted = self.engine.audit_catalog().await?;
        for audit in &drifted {
            tracing::error!(
                book_id = %audit.book_id,
                total = audit.total_copies,
                available = audit.available_copies,
                active_loans = audit.active_loans,
                "book inventory drifted"
            );
        }
        Ok(drifted.len())
    }

    /// Stops accepting operations and waits for the notifier to drain
    /// events already published. Returns the number of events it handled.
    pub async fn shutdown(self) -> Result<u64, AppError> {
        drop(self.engine);
        Ok(self.notifier.await?)
    }
}
