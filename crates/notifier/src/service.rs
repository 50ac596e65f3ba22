//! Idempotent notification recording with best-effort email.

use chrono::{DateTime, Utc};
use common::{BookId, BorrowRequestId, NotificationId, ReturnRequestId, UserId};
use domain::store::UNIQUE_NOTIFICATION;
use domain::query::MAX_PAGE_SIZE;
use domain::{
    BookRepository, LendingStore, Notification, NotificationKind, NotificationQuery,
    NotificationRepository, UnitOfWork, UserDirectory,
};
use uuid::Uuid;

use crate::email::{EmailMessage, EmailSender};
use crate::error::{NotifierError, Result};

/// Outcome of a notify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A new notification was stored.
    Created(Notification),
    /// The user already has this notification.
    Skipped,
}

impl Delivery {
    pub fn is_created(&self) -> bool {
        matches!(self, Delivery::Created(_))
    }
}

/// What the user is being told, with the details each message needs.
#[derive(Debug, Clone, Copy)]
enum Notice<'a> {
    BorrowApproved { due_date: DateTime<Utc> },
    BorrowRejected { remarks: Option<&'a str> },
    ReturnApproved,
    ReturnRejected { remarks: Option<&'a str> },
    BookAvailable,
}

impl Notice<'_> {
    fn kind(&self) -> NotificationKind {
        match self {
            Notice::BorrowApproved { .. } => NotificationKind::BorrowRequestApproved,
            Notice::BorrowRejected { .. } => NotificationKind::BorrowRequestRejected,
            Notice::ReturnApproved => NotificationKind::ReturnRequestApproved,
            Notice::ReturnRejected { .. } => NotificationKind::ReturnRequestRejected,
            Notice::BookAvailable => NotificationKind::BookAvailable,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Notice::BorrowApproved { .. } => "Borrow Request Approved",
            Notice::BorrowRejected { .. } => "Borrow Request Rejected",
            Notice::ReturnApproved => "Return Request Approved",
            Notice::ReturnRejected { .. } => "Return Request Rejected",
            Notice::BookAvailable => "Book Available",
        }
    }

    fn message(&self, book_title: &str) -> String {
        match self {
            Notice::BorrowApproved { due_date } => format!(
                "Your borrow request for the book '{book_title}' has been approved. Due Date: {}",
                due_date.format("%Y-%m-%d")
            ),
            Notice::BorrowRejected { remarks } => with_reason(
                format!("Your borrow request for the book '{book_title}' has been rejected."),
                *remarks,
            ),
            Notice::ReturnApproved => {
                format!("Your return request for the book '{book_title}' has been approved.")
            }
            Notice::ReturnRejected { remarks } => with_reason(
                format!("Your return request for the book '{book_title}' has been rejected."),
                *remarks,
            ),
            Notice::BookAvailable => {
                format!("The book '{book_title}' is now available for borrowing.")
            }
        }
    }
}

fn with_reason(message: String, remarks: Option<&str>) -> String {
    match remarks {
        Some(reason) => format!("{message} Reason: {reason}"),
        None => message,
    }
}

/// Stores notifications and emails users about lifecycle outcomes.
///
/// Each notify call is idempotent per `(user, related entity, kind)`. Email
/// failures are logged and counted but never returned.
pub struct NotificationService<S: LendingStore, E: EmailSender> {
    store: S,
    email: E,
}

impl<S: LendingStore, E: EmailSender> NotificationService<S, E> {
    pub fn new(store: S, email: E) -> Self {
        Self { store, email }
    }

    #[tracing::instrument(skip(self))]
    pub async fn notify_borrow_approved(
        &self,
        request_id: BorrowRequestId,
        user_id: UserId,
        book_id: BookId,
        due_date: DateTime<Utc>,
    ) -> Result<Delivery> {
        self.deliver(
            user_id,
            book_id,
            request_id.as_uuid(),
            Notice::BorrowApproved { due_date },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn notify_borrow_rejected(
        &self,
        request_id: BorrowRequestId,
        user_id: UserId,
        book_id: BookId,
        remarks: Option<&str>,
    ) -> Result<Delivery> {
        self.deliver(
            user_id,
            book_id,
            request_id.as_uuid(),
            Notice::BorrowRejected { remarks },
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn notify_return_approved(
        &self,
        request_id: ReturnRequestId,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Delivery> {
        self.deliver(user_id, book_id, request_id.as_uuid(), Notice::ReturnApproved)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn notify_return_rejected(
        &self,
        request_id: ReturnRequestId,
        user_id: UserId,
        book_id: BookId,
        remarks: Option<&str>,
    ) -> Result<Delivery> {
        self.deliver(
            user_id,
            book_id,
            request_id.as_uuid(),
            Notice::ReturnRejected { remarks },
        )
        .await
    }

    /// Tells a user a wishlisted book is back. Keyed on the book itself.
    #[tracing::instrument(skip(self))]
    pub async fn notify_book_available(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> Result<Delivery> {
        self.deliver(user_id, book_id, book_id.as_uuid(), Notice::BookAvailable)
            .await
    }

    /// Returns one page of the user's notifications, newest first.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        query: &NotificationQuery,
    ) -> Result<Vec<Notification>> {
        if !query.is_valid() {
            return Err(NotifierError::InvalidQuery(format!(
                "page {} of size {} (pages start at 1, sizes run 1..={MAX_PAGE_SIZE})",
                query.page, query.page_size
            )));
        }
        let mut uow = self.store.begin().await?;
        if uow.find_user(user_id).await?.is_none_or(|u| u.is_deleted) {
            return Err(NotifierError::not_found("User", user_id));
        }
        Ok(uow.list_notifications(user_id, query).await?)
    }

    /// Marks one of the user's notifications as read. Already-read
    /// notifications are returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn mark_as_read(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<Notification> {
        let mut uow = self.store.begin().await?;
        let mut notification = uow
            .find_notification(notification_id)
            .await?
            .ok_or_else(|| NotifierError::not_found("Notification", notification_id))?;

        if notification.user_id != user_id {
            return Err(NotifierError::Unauthorized(format!(
                "notification {notification_id} does not belong to user {user_id}"
            )));
        }
        if notification.is_read {
            return Ok(notification);
        }

        notification.is_read = true;
        uow.update_notification(&notification).await?;
        uow.commit().await?;
        Ok(notification)
    }

    async fn deliver(
        &self,
        user_id: UserId,
        book_id: BookId,
        related_entity_id: Uuid,
        notice: Notice<'_>,
    ) -> Result<Delivery> {
        let kind = notice.kind();
        let mut uow = self.store.begin().await?;

        let recorded = match self
            .record(&mut uow, user_id, book_id, related_entity_id, notice)
            .await
        {
            Ok(Some(recorded)) => {
                uow.commit().await?;
                recorded
            }
            Ok(None) => {
                uow.rollback().await?;
                metrics::counter!("notifier_notifications_skipped_total", "kind" => kind.as_str())
                    .increment(1);
                tracing::debug!(%user_id, %related_entity_id, %kind, "notification already exists");
                return Ok(Delivery::Skipped);
            }
            Err(e) => {
                if let Err(rollback) = uow.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        };

        let (notification, email) = recorded;
        metrics::counter!("notifier_notifications_created_total", "kind" => kind.as_str())
            .increment(1);
        tracing::info!(notification_id = %notification.id, %user_id, %kind, "notification created");

        match email {
            Some(to) => self.send_email(to, &notification).await,
            None => tracing::debug!(%user_id, "no email address on file"),
        }

        Ok(Delivery::Created(notification))
    }

    async fn record(
        &self,
        uow: &mut S::Uow,
        user_id: UserId,
        book_id: BookId,
        related_entity_id: Uuid,
        notice: Notice<'_>,
    ) -> Result<Option<(Notification, Option<String>)>> {
        let user = match uow.find_user(user_id).await? {
            Some(user) if !user.is_deleted => user,
            _ => return Err(NotifierError::not_found("User", user_id)),
        };
        let book = uow
            .find_book(book_id)
            .await?
            .ok_or_else(|| NotifierError::not_found("Book", book_id))?;

        if uow
            .notification_exists(user_id, related_entity_id, notice.kind())
            .await?
        {
            return Ok(None);
        }

        let notification = Notification::new(
            user_id,
            notice.kind(),
            notice.title(),
            notice.message(&book.title),
            related_entity_id,
            Some(book_id),
            Utc::now(),
        );
        match uow.insert_notification(&notification).await {
            Ok(()) => Ok(Some((notification, user.email))),
            Err(e) if e.is_unique_violation(UNIQUE_NOTIFICATION) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn send_email(&self, to: String, notification: &Notification) {
        let message = EmailMessage {
            to,
            subject: notification.title.clone(),
            body: notification.message.clone(),
        };
        if let Err(e) = self.email.send(&message).await {
            metrics::counter!("notifier_email_failures_total", "kind" => notification.kind.as_str())
                .increment(1);
            tracing::warn!(
                notification_id = %notification.id,
                to = %message.to,
                error = %e,
                "failed to send notification email"
            );
        }
    }
}
