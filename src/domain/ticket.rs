//! Ticket entity: one stake spread over one or more bets.
//!
//! A ticket wins only if every one of its bets wins, even when the bets
//! sit on different races. It is settled once, after the last of those
//! races has finished.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bet::Bet;
use super::error::DomainError;

/// Stakes at or below this amount are rejected at construction.
pub const MIN_CONSTRUCTIBLE_STAKE: Decimal = dec!(0.1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Pending,
    Rejected,
    Success,
    Won,
    Lost,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Success => write!(f, "Success"),
            Self::Won => write!(f, "Won"),
            Self::Lost => write!(f, "Lost"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub total_stake: Decimal,
    pub created_at: DateTime<Utc>,
    status: TicketStatus,
    total_payout: Option<Decimal>,
    processed_at: Option<DateTime<Utc>>,
    bets: Vec<Bet>,
}

impl Ticket {
    /// Create a pending ticket. Bets are re-owned by `id`.
    pub fn create(id: Uuid, total_stake: Decimal, mut bets: Vec<Bet>) -> Result<Self, DomainError> {
        if total_stake <= MIN_CONSTRUCTIBLE_STAKE {
            return Err(DomainError::InvalidArgument(format!(
                "total stake must be greater than {MIN_CONSTRUCTIBLE_STAKE}, got {total_stake}"
            )));
        }
        for bet in &mut bets {
            bet.ticket_id = id;
        }

        Ok(Self {
            id,
            total_stake,
            created_at: Utc::now(),
            status: TicketStatus::Pending,
            total_payout: None,
            processed_at: None,
            bets,
        })
    }

    pub const fn status(&self) -> TicketStatus {
        self.status
    }

    pub const fn total_payout(&self) -> Option<Decimal> {
        self.total_payout
    }

    pub const fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    /// Mutable access for race finishing; outcomes are still set once.
    pub fn bets_mut(&mut self) -> impl Iterator<Item = &mut Bet> {
        self.bets.iter_mut()
    }

    pub fn approve(&mut self) -> Result<(), DomainError> {
        if self.status != TicketStatus::Pending {
            return Err(DomainError::transition("ticket", self.status, "approve"));
        }
        if self.bets.is_empty() {
            return Err(DomainError::InvalidState(
                "cannot approve a ticket with no bets".to_string(),
            ));
        }
        self.status = TicketStatus::Success;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), DomainError> {
        if self.status != TicketStatus::Pending {
            return Err(DomainError::transition("ticket", self.status, "reject"));
        }
        self.status = TicketStatus::Rejected;
        Ok(())
    }

    /// True iff every bet has resolved as a win.
    pub fn is_winning(&self) -> bool {
        !self.bets.is_empty() && self.bets.iter().all(|b| b.is_winning == Some(true))
    }

    pub fn all_bets_resolved(&self) -> bool {
        self.bets.iter().all(Bet::is_resolved)
    }

    /// Races whose bets on this ticket are still unresolved.
    pub fn pending_race_ids(&self) -> BTreeSet<Uuid> {
        self.bets
            .iter()
            .filter(|b| !b.is_resolved())
            .map(|b| b.race_id)
            .collect()
    }

    /// Every race referenced by this ticket.
    pub fn race_ids(&self) -> BTreeSet<Uuid> {
        self.bets.iter().map(|b| b.race_id).collect()
    }

    pub fn is_ready_for_settlement(&self) -> bool {
        self.status == TicketStatus::Success
            && self.processed_at.is_none()
            && self.all_bets_resolved()
    }

    /// Stake multiplied by the product of all odds.
    pub fn potential_win(&self) -> Decimal {
        potential_win(self.total_stake, self.bets.iter().map(|b| b.odds))
    }

    /// Stake multiplied by the sum of all odds.
    pub fn winning_payout(&self) -> Decimal {
        self.total_stake * self.bets.iter().map(|b| b.odds).sum::<Decimal>()
    }

    /// Settle the ticket as Won or Lost. Returns the payout when won.
    pub fn process_result(&mut self, now: DateTime<Utc>) -> Result<Option<Decimal>, DomainError> {
        if self.status != TicketStatus::Success {
            return Err(DomainError::InvalidState(format!(
                "can only process results for successful tickets, ticket {} is {}",
                self.id, self.status
            )));
        }
        if self.processed_at.is_some() {
            return Err(DomainError::InvalidState(format!(
                "ticket {} has already been processed",
                self.id
            )));
        }
        if !self.all_bets_resolved() {
            return Err(DomainError::InvalidState(format!(
                "ticket {} still has unresolved bets",
                self.id
            )));
        }

        let won = self.is_winning();
        self.status = if won { TicketStatus::Won } else { TicketStatus::Lost };
        self.processed_at = Some(now);
        if won {
            let payout = self.winning_payout();
            self.total_payout = Some(payout);
            Ok(Some(payout))
        } else {
            Ok(None)
        }
    }
}

/// Stake times the product of `odds`, as used to cap potential wins.
pub fn potential_win(stake: Decimal, odds: impl IntoIterator<Item = Decimal>) -> Decimal {
    odds.into_iter().fold(stake, |acc, o| acc * o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bet::BetType;

    fn bet(race_id: Uuid, odds: Decimal) -> Bet {
        Bet::new(race_id, Uuid::nil(), 2, BetType::Winner, odds).unwrap()
    }

    fn approved(bets: Vec<Bet>, stake: Decimal) -> Ticket {
        let mut t = Ticket::create(Uuid::new_v4(), stake, bets).unwrap();
        t.approve().unwrap();
        t
    }

    #[test]
    fn test_create_rejects_tiny_stake() {
        let err = Ticket::create(Uuid::new_v4(), dec!(0.1), vec![]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
        assert!(Ticket::create(Uuid::new_v4(), dec!(0.11), vec![]).is_ok());
    }

    #[test]
    fn test_create_rebinds_bets() {
        let id = Uuid::new_v4();
        let t = Ticket::create(id, dec!(5), vec![bet(Uuid::new_v4(), dec!(2))]).unwrap();
        assert_eq!(t.status(), TicketStatus::Pending);
        assert!(t.bets().iter().all(|b| b.ticket_id == id));
    }

    #[test]
    fn test_approve_requires_bets_and_pending() {
        let mut empty = Ticket::create(Uuid::new_v4(), dec!(5), vec![]).unwrap();
        assert!(matches!(empty.approve(), Err(DomainError::InvalidState(_))));

        let mut t = approved(vec![bet(Uuid::new_v4(), dec!(2))], dec!(5));
        assert_eq!(t.status(), TicketStatus::Success);
        assert!(t.approve().unwrap_err().is_transition());
        assert!(t.reject().unwrap_err().is_transition());
    }

    #[test]
    fn test_reject_from_pending() {
        let mut t = Ticket::create(Uuid::new_v4(), dec!(5), vec![]).unwrap();
        t.reject().unwrap();
        assert_eq!(t.status(), TicketStatus::Rejected);
    }

    #[test]
    fn test_single_winner_payout() {
        let race = Uuid::new_v4();
        let mut t = approved(vec![bet(race, dec!(2.5))], dec!(10));
        for b in t.bets_mut() {
            b.process_result(&[2, 4, 5]).unwrap();
        }
        assert!(t.is_ready_for_settlement());

        let payout = t.process_result(Utc::now()).unwrap();
        assert_eq!(payout, Some(dec!(25)));
        assert_eq!(t.status(), TicketStatus::Won);
        assert_eq!(t.total_payout(), Some(dec!(25)));
        assert!(t.processed_at().is_some());
    }

    #[test]
    fn test_one_losing_leg_loses_ticket() {
        let (r1, r2) = (Uuid::new_v4(), Uuid::new_v4());
        let mut t = approved(vec![bet(r1, dec!(2)), bet(r2, dec!(3))], dec!(10));
        {
            let mut bets = t.bets_mut();
            bets.next().unwrap().process_result(&[2, 1, 1]).unwrap();
            bets.next().unwrap().process_result(&[6, 2, 1]).unwrap();
        }

        assert!(!t.is_winning());
        assert_eq!(t.process_result(Utc::now()).unwrap(), None);
        assert_eq!(t.status(), TicketStatus::Lost);
        assert_eq!(t.total_payout(), None);
    }

    #[test]
    fn test_unresolved_leg_blocks_settlement() {
        let (r1, r2) = (Uuid::new_v4(), Uuid::new_v4());
        let mut t = approved(vec![bet(r1, dec!(2)), bet(r2, dec!(3))], dec!(10));
        t.bets_mut().next().unwrap().process_result(&[6, 1, 1]).unwrap();

        assert!(!t.is_ready_for_settlement());
        assert_eq!(t.pending_race_ids(), BTreeSet::from([r2]));
        assert!(matches!(t.process_result(Utc::now()), Err(DomainError::InvalidState(_))));
        assert_eq!(t.status(), TicketStatus::Success);
    }

    #[test]
    fn test_process_result_is_guarded() {
        let mut t = approved(vec![bet(Uuid::new_v4(), dec!(2))], dec!(10));
        t.bets_mut().next().unwrap().process_result(&[1, 1, 3]).unwrap();
        t.process_result(Utc::now()).unwrap();
        assert!(matches!(t.process_result(Utc::now()), Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn test_payout_sums_odds_while_cap_multiplies() {
        let t = approved(
            vec![bet(Uuid::new_v4(), dec!(2)), bet(Uuid::new_v4(), dec!(3))],
            dec!(10),
        );
        assert_eq!(t.winning_payout(), dec!(50));
        assert_eq!(t.potential_win(), dec!(60));
    }
}
