//! Borrow/return lifecycle engine for the library lending system.
//!
//! The engine validates and executes every state transition of a copy:
//! request, approve, reject, return request, return approval, return
//! rejection. Staff also edit the catalog and administer accounts.
//! Multi-row mutations run inside a single unit of work from a
//! [`domain::LendingStore`]; lifecycle events are published only after the
//! unit of work commits, so notification failures never affect the outcome.

pub mod borrow;
pub mod catalog;
pub mod clock;
pub mod engine;
pub mod ledger;
pub mod policy;
pub mod publisher;
pub mod queries;
pub mod returns;
pub mod users;
pub mod wishlist;

mod unit_of_work;

pub use borrow::BorrowApproval;
pub use catalog::InventoryAudit;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::LifecycleEngine;
pub use ledger::InventoryLedger;
pub use policy::LendingPolicy;
pub use publisher::{ChannelPublisher, EventPublisher, NoopPublisher, RecordingPublisher};
pub use returns::ReturnApproval;
