//! Bet Placement Use Case - Validate, Reserve, Finalize
//!
//! Placement flow:
//! 1. Validate stake, bets and potential win against global limits
//! 2. Reserve the stake in the ledger under a fresh ticket id
//! 3. Re-check that every referenced race is still open for betting
//! 4. Build and approve the ticket, persist it, commit the reserved stake
//!
//! The ledger and the store are separate resources, so step 2 is paired
//! with a compensating release. The reservation is held by a guard that
//! returns the funds when dropped, so an error after step 2 and a
//! placement future cancelled mid-flight both leave the ledger as it
//! was. The store repeats the open-race check inside its commit, which
//! closes the gap between step 3 and step 4.

use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::ticket::potential_win;
use crate::domain::{Bet, RaceOdds, RaceStatus, Ticket};
use crate::error::{ExchangeError, ExchangeResult};
use crate::ports::store::{ChangeSet, Store, WriteConflict};

use super::wallet_ledger::WalletLedger;

/// One leg of a placement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRequest {
  pub race_odds_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceBetRequest {
  pub total_stake: Decimal,
  pub bets: Vec<BetRequest>,
}

/// A successfully placed ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedTicket {
  pub ticket_id: Uuid,
  pub potential_win: Decimal,
  pub message: String,
}

/// Odds rows resolved during validation.
struct ValidatedTicket {
  odds: Vec<RaceOdds>,
  potential_win: Decimal,
}

/// Reserved stake that is released on drop unless disarmed.
struct Reservation<'a> {
  ledger: &'a WalletLedger,
  ticket_id: Uuid,
  stake: Decimal,
  armed: bool,
}

impl Reservation<'_> {
  /// Keep the funds; they now belong to a stored ticket.
  fn disarm(mut self) {
    self.armed = false;
  }
}

impl Drop for Reservation<'_> {
  fn drop(&mut self) {
    if self.armed {
      let released = self.ledger.release(self.stake, self.ticket_id);
      warn!(ticket_id = %self.ticket_id, released = %released, "Ticket placement rolled back");
    }
  }
}

/// Bet placement service.
pub struct BetPlacement<S: Store> {
  store: Arc<S>,
  ledger: Arc<WalletLedger>,
}

impl<S: Store> BetPlacement<S> {
  pub fn new(store: Arc<S>, ledger: Arc<WalletLedger>) -> Self {
    Self { store, ledger }
  }

  /// Place a ticket. See the module docs for the full flow.
  #[instrument(skip(self, request), fields(stake = %request.total_stake, bets = request.bets.len()))]
  pub async fn place_bet(&self, request: &PlaceBetRequest) -> ExchangeResult<PlacedTicket> {
    let validated = match self.validate(request).await? {
      Ok(v) => v,
      Err(errors) => {
        warn!(errors = %errors.join(", "), "Ticket validation failed");
        return Err(ExchangeError::Validation(errors));
      }
    };

    let ticket_id = Uuid::new_v4();
    let stake = request.total_stake;
    if !self.ledger.try_reserve(stake, ticket_id) {
      let available = self.ledger.status().balance;
      warn!(ticket_id = %ticket_id, stake = %stake, available = %available, "Insufficient funds");
      return Err(ExchangeError::InsufficientFunds {
        requested: stake,
        available,
      });
    }

    let reservation = Reservation {
      ledger: &self.ledger,
      ticket_id,
      stake,
      armed: true,
    };

    if let Err(e) = self.finalize(ticket_id, stake, validated.odds).await {
      warn!(ticket_id = %ticket_id, error = %e, "Ticket placement failed");
      return Err(e);
    }
    if !self.ledger.try_commit(stake, ticket_id) {
      error!(ticket_id = %ticket_id, stake = %stake, "Ticket stored but reserved stake was not committed");
    }
    reservation.disarm();

    info!(
      ticket_id = %ticket_id,
      potential_win = %validated.potential_win,
      "Ticket placed"
    );
    Ok(PlacedTicket {
      ticket_id,
      potential_win: validated.potential_win,
      message: format!(
        "Bet placed successfully. Potential win: {}",
        validated.potential_win.round_dp(2)
      ),
    })
  }

  /// Collect every validation problem; `Ok(Err(_))` means rejected.
  async fn validate(
    &self,
    request: &PlaceBetRequest,
  ) -> ExchangeResult<Result<ValidatedTicket, Vec<String>>> {
    let limits = self.store.global_configuration().await?;
    let mut errors = Vec::new();

    if request.total_stake < limits.min_ticket_stake {
      errors.push(format!("Minimum stake is {}", limits.min_ticket_stake));
    }
    if request.total_stake <= Decimal::ZERO {
      errors.push("Total stake must be greater than 0".to_string());
    }
    if request.bets.is_empty() {
      errors.push("At least one bet is required".to_string());
    }

    let mut odds = Vec::with_capacity(request.bets.len());
    for bet in &request.bets {
      match self.store.race_odds(bet.race_odds_id).await? {
        Some(row) => odds.push(row),
        None => errors.push(format!("Race odds with ID {} not found", bet.race_odds_id)),
      }
    }

    let potential = potential_win(request.total_stake, odds.iter().map(|o| o.odds));
    if potential > limits.max_ticket_win {
      errors.push(format!(
        "Maximum potential win is {}. This ticket could win {}",
        limits.max_ticket_win,
        potential.round_dp(2)
      ));
    }

    if errors.is_empty() {
      Ok(Ok(ValidatedTicket {
        odds,
        potential_win: potential,
      }))
    } else {
      Ok(Err(errors))
    }
  }

  /// Steps after the reservation; any error here triggers the release.
  async fn finalize(&self, ticket_id: Uuid, stake: Decimal, odds: Vec<RaceOdds>) -> ExchangeResult<()> {
    let race_ids: BTreeSet<Uuid> = odds.iter().map(|o| o.race_id).collect();
    for race_id in race_ids {
      let race = self
        .store
        .race(race_id)
        .await?
        .ok_or_else(|| ExchangeError::not_found("race", race_id))?;
      if race.status() != RaceStatus::Scheduled {
        return Err(ExchangeError::BettingClosed(race_id));
      }
    }

    let bets = odds
      .iter()
      .map(|o| Bet::new(o.race_id, ticket_id, o.selection, o.bet_type, o.odds))
      .collect::<Result<Vec<_>, _>>()?;

    let mut ticket = Ticket::create(ticket_id, stake, bets)?;
    ticket.approve()?;
    self
      .store
      .commit(ChangeSet::with_ticket(ticket))
      .await
      .map_err(|e| match e.downcast_ref::<WriteConflict>() {
        Some(WriteConflict::BettingClosed { race_id, .. }) => ExchangeError::BettingClosed(*race_id),
        _ => ExchangeError::from(e),
      })
  }
}
