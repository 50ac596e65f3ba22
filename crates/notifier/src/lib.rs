//! Notifier for the library lending system.
//!
//! Lifecycle events arrive after the owning unit of work has committed. The
//! [`NotificationDispatcher`] maps each one to a [`NotificationService`] call,
//! which stores at most one notification per user, related entity and kind
//! and emails the user on a best-effort basis.

pub mod dispatcher;
pub mod email;
pub mod error;
pub mod service;

pub use dispatcher::NotificationDispatcher;
pub use email::{EmailMessage, EmailSender, LoggingEmailSender};
pub use error::{NotifierError, Result};
pub use service::{Delivery, NotificationService};
