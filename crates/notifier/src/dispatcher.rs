//! Consumes lifecycle events and turns them into notifications.

use domain::{LendingEvent, LendingStore};
use tokio::sync::mpsc;

use crate::Result;
use crate::email::EmailSender;
use crate::service::{Delivery, NotificationService};

/// Routes each [`LendingEvent`] to the matching notify call.
///
/// Events are handled one at a time and independently: a failure for one
/// event is logged and counted, and the next event is processed as usual.
pub struct NotificationDispatcher<S: LendingStore, E: EmailSender> {
    service: NotificationService<S, E>,
}

impl<S: LendingStore, E: EmailSender> NotificationDispatcher<S, E> {
    pub fn new(service: NotificationService<S, E>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &NotificationService<S, E> {
        &self.service
    }

    /// Handles a single event.
    #[tracing::instrument(skip(self, event), fields(event_type = event.event_type()))]
    pub async fn handle(&self, event: &LendingEvent) -> Result<Delivery> {
        match event {
            LendingEvent::BorrowApproved {
                request_id,
                user_id,
                book_id,
                due_date,
            } => {
                self.service
                    .notify_borrow_approved(*request_id, *user_id, *book_id, *due_date)
                    .await
            }
            LendingEvent::BorrowRejected {
                request_id,
                user_id,
                book_id,
                remarks,
            } => {
                self.service
                    .notify_borrow_rejected(*request_id, *user_id, *book_id, remarks.as_deref())
                    .await
            }
            LendingEvent::ReturnApproved {
                request_id,
                user_id,
                book_id,
            } => {
                self.service
                    .notify_return_approved(*request_id, *user_id, *book_id)
                    .await
            }
            LendingEvent::ReturnRejected {
                request_id,
                user_id,
                book_id,
                remarks,
            } => {
                self.service
                    .notify_return_rejected(*request_id, *user_id, *book_id, remarks.as_deref())
                    .await
            }
            LendingEvent::BookAvailable { book_id, user_id } => {
                self.service.notify_book_available(*book_id, *user_id).await
            }
        }
    }

    /// Processes events until every sender is dropped. Returns the number of
    /// events received.
    pub async fn run(&self, mut events: mpsc::Receiver<LendingEvent>) -> u64 {
        tracing::info!("notification dispatcher started");
        let mut received: u64 = 0;

        while let Some(event) = events.recv().await {
            received += 1;
            if let Err(e) = self.handle(&event).await {
                metrics::counter!("notifier_dispatch_failures_total", "event_type" => event.event_type())
                    .increment(1);
                tracing::warn!(
                    event_type = event.event_type(),
                    user_id = %event.user_id(),
                    error = %e,
                    "failed to deliver notification"
                );
            }
        }

        tracing::info!(events_received = received, "event channel closed, dispatcher stopping");
        received
    }
}
