//! Application error taxonomy.
//!
//! `ExchangeError` is what callers of the use cases see. Domain invariant
//! failures are wrapped as-is; store and journal failures arrive as
//! `anyhow::Error` with their context chain intact.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::DomainError;
use crate::ports::store::WriteConflict;

#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Request rejected before any state changed.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Decimal, available: Decimal },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    /// A referenced race stopped taking bets while the ticket was placed.
    #[error("betting closed for race {0}")]
    BettingClosed(Uuid),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ExchangeError {
    pub const fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    /// Whether this is a state-machine precondition miss.
    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Domain(e) if e.is_transition())
    }

    /// The store conflict behind this error, if any.
    pub fn write_conflict(&self) -> Option<&WriteConflict> {
        match self {
            Self::Store(e) => e.downcast_ref::<WriteConflict>(),
            _ => None,
        }
    }

    /// Whether a concurrent writer already made this change, or a
    /// newer one.
    pub fn is_write_conflict(&self) -> bool {
        self.write_conflict().is_some()
    }

    /// Human-readable messages, one per problem.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Validation(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
