//! Store implementations for the lending unit-of-work ports.
//!
//! - [`InMemoryLendingStore`] serializes every unit of work behind one lock.
//! - [`PostgresLendingStore`] maps units of work onto database transactions.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryLendingStore, InMemoryUnitOfWork};
pub use postgres::{PostgresLendingStore, PostgresUnitOfWork};
