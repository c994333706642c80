//! Domain error taxonomy.
//!
//! Every invariant check in the inner ring reports through `DomainError`.
//! Callers decide the policy: the scheduler treats `InvalidTransition`
//! as a benign skip, explicit API calls surface it to the caller.

use thiserror::Error;

/// Errors raised by domain entities when an invariant would be violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A constructor or setter received an out-of-range value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A state-machine transition was requested from the wrong state.
    #[error("cannot {action} {entity} in state {from}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    /// A race result did not carry three placed selections.
    #[error("invalid race result: {0}")]
    InvalidResult(String),

    /// An operation is not legal for the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl DomainError {
    pub(crate) fn transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        action: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            action,
        }
    }

    /// Whether this error is a precondition miss on a state machine.
    pub fn is_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}
