//! Domain layer - Races, tickets, odds and the fund ledger.
//!
//! Pure entities and math for the exchange. Nothing here performs I/O;
//! transition timestamps and randomness are passed in by the caller.
//! All types are serializable and testable in isolation.

pub mod bet;
pub mod error;
pub mod limits;
pub mod names;
pub mod odds;
pub mod race;
pub mod result;
pub mod sequence;
pub mod ticket;
pub mod wallet;

// Re-export core types for convenience
pub use bet::{Bet, BetType};
pub use error::DomainError;
pub use limits::GlobalConfiguration;
pub use odds::{OddsModel, RaceOdds};
pub use race::{Race, RaceStatus};
pub use result::RaceResult;
pub use ticket::{Ticket, TicketStatus};
pub use wallet::{TransactionType, Wallet, WalletStatus, WalletTransaction};
