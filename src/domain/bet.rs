//! Single leg of a ticket.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;
use super::result::RaceResult;
use super::sequence::is_valid_selection;

/// Placement a bet requires to win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetType {
    /// Selection must finish first.
    Winner,
    /// Selection must finish first or second.
    Top2,
    /// Selection must finish in the top three.
    Top3,
}

impl BetType {
    pub const ALL: [Self; 3] = [Self::Winner, Self::Top2, Self::Top3];

    /// Whether `selection` satisfies this bet type under `result`.
    pub fn wins(self, selection: u8, result: &RaceResult) -> bool {
        match self {
            Self::Winner => result.is_winner(selection),
            Self::Top2 => result.is_in_top2(selection),
            Self::Top3 => result.is_in_top3(selection),
        }
    }
}

impl std::fmt::Display for BetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Winner => write!(f, "Winner"),
            Self::Top2 => write!(f, "Top2"),
            Self::Top3 => write!(f, "Top3"),
        }
    }
}

/// A selection on one race with odds snapshotted at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub race_id: Uuid,
    pub ticket_id: Uuid,
    pub selection: u8,
    pub bet_type: BetType,
    pub odds: Decimal,
    /// `None` until the owning race finishes; set exactly once.
    pub is_winning: Option<bool>,
}

impl Bet {
    pub fn new(
        race_id: Uuid,
        ticket_id: Uuid,
        selection: u8,
        bet_type: BetType,
        odds: Decimal,
    ) -> Result<Self, DomainError> {
        if !is_valid_selection(selection) {
            return Err(DomainError::InvalidArgument(format!(
                "selection must be between 1 and 6, got {selection}"
            )));
        }
        if odds <= Decimal::ONE {
            return Err(DomainError::InvalidArgument(format!(
                "odds must be greater than 1, got {odds}"
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            race_id,
            ticket_id,
            selection,
            bet_type,
            odds,
            is_winning: None,
        })
    }

    pub const fn is_resolved(&self) -> bool {
        self.is_winning.is_some()
    }

    /// Resolve the bet against the raw placed positions of its race.
    ///
    /// A bet that is already resolved keeps its outcome.
    pub fn process_result(&mut self, positions: &[u8]) -> Result<bool, DomainError> {
        let result = RaceResult::from_slice(positions)?;
        if let Some(outcome) = self.is_winning {
            return Ok(outcome);
        }

        let won = self.bet_type.wins(self.selection, &result);
        self.is_winning = Some(won);
        Ok(won)
    }
}
