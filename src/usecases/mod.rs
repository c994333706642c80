//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the exchange's core workflows. Each use case is a self-contained
//! business operation.
//!
//! Use cases:
//! - `WalletLedger`: Serialized reserve/commit/release/payout ledger
//! - `RaceLifecycle`: Time-driven race transitions and pool upkeep
//! - `BetPlacement`: Validate, reserve and persist a ticket
//! - `TicketSettlement`: Resolve tickets and credit payouts
//! - `Scheduler`: Lifecycle and settlement polling loops

pub mod betting;
pub mod race_lifecycle;
pub mod scheduler;
pub mod settlement;
pub mod wallet_ledger;

pub use betting::{BetPlacement, BetRequest, PlaceBetRequest, PlacedTicket};
pub use race_lifecycle::{LifecycleSettings, RaceLifecycle};
pub use scheduler::{Scheduler, SchedulerSettings};
pub use settlement::{SettlementReport, TicketSettlement};
pub use wallet_ledger::WalletLedger;
