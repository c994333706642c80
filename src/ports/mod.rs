//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `Store`: Race, odds and ticket persistence with atomic commit
//! - `Journal`: Append-only ledger and settlement audit log

pub mod journal;
pub mod store;

pub use journal::{Journal, SettlementRecord};
pub use store::{BetOutcome, ChangeSet, Store, TicketQuery, WriteConflict};
