//! Store Port - Race and Ticket Persistence Interface
//!
//! Query access to races, odds and tickets plus a single atomic
//! `commit` that applies everything a tick or request changed.
//! Bet outcomes are applied set-once: a bet that already has an
//! outcome keeps it. A commit that would overwrite newer stored state
//! is rejected whole with a [`WriteConflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{GlobalConfiguration, Race, RaceOdds, RaceStatus, Ticket, TicketStatus};

/// Resolved outcome of one bet, keyed by its ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetOutcome {
  pub ticket_id: Uuid,
  pub bet_id: Uuid,
  pub is_winning: bool,
}

/// A commit lost to a concurrent writer.
///
/// Stores return it through `anyhow`; callers recover it with
/// `downcast_ref` and treat the change as already made elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteConflict {
  /// Race writes must advance the stored status.
  #[error("race {race_id} is already {stored}, cannot write {attempted}")]
  RaceStatus {
    race_id: Uuid,
    stored: RaceStatus,
    attempted: RaceStatus,
  },

  #[error("race {0} result is already set")]
  RaceResult(Uuid),

  #[error("ticket {0} is already settled")]
  TicketSettled(Uuid),

  /// A new ticket referenced a race that no longer takes bets.
  #[error("ticket {ticket_id} references race {race_id}, which is closed to betting")]
  BettingClosed { ticket_id: Uuid, race_id: Uuid },
}

/// Pending changes applied by one `commit`.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
  /// Races to insert or replace.
  pub races: Vec<Race>,
  /// Tickets to insert or replace.
  pub tickets: Vec<Ticket>,
  /// Bet outcomes to apply to stored tickets.
  pub bet_outcomes: Vec<BetOutcome>,
}

impl ChangeSet {
  pub fn is_empty(&self) -> bool {
    self.races.is_empty() && self.tickets.is_empty() && self.bet_outcomes.is_empty()
  }

  pub fn with_race(race: Race) -> Self {
    Self {
      races: vec![race],
      ..Self::default()
    }
  }

  pub fn with_ticket(ticket: Ticket) -> Self {
    Self {
      tickets: vec![ticket],
      ..Self::default()
    }
  }

  /// Append every change from `other`.
  pub fn merge(&mut self, other: Self) {
    self.races.extend(other.races);
    self.tickets.extend(other.tickets);
    self.bet_outcomes.extend(other.bet_outcomes);
  }
}

/// Ticket listing filter; results are newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketQuery {
  pub status: Option<TicketStatus>,
  pub offset: usize,
  /// `None` returns everything after `offset`.
  pub limit: Option<usize>,
}

/// Trait for race/ticket persistence providers.
#[async_trait]
pub trait Store: Send + Sync + 'static {
  /// Look up a race by id.
  async fn race(&self, id: Uuid) -> anyhow::Result<Option<Race>>;

  /// Races in `status`, ordered by start time.
  async fn races_by_status(&self, status: RaceStatus) -> anyhow::Result<Vec<Race>>;

  /// Races in `status` starting at or before `cutoff`, ordered by start time.
  async fn races_starting_before(
    &self,
    status: RaceStatus,
    cutoff: DateTime<Utc>,
  ) -> anyhow::Result<Vec<Race>>;

  /// Running races ending at or before `cutoff`, ordered by start time.
  async fn running_races_ending_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<Race>>;

  /// Races still open for betting, ordered by start time.
  async fn active_races(&self) -> anyhow::Result<Vec<Race>>;

  async fn active_race_count(&self) -> anyhow::Result<usize>;

  /// The scheduled race with the latest end time.
  async fn latest_scheduled_race(&self) -> anyhow::Result<Option<Race>>;

  /// Look up an odds row by id.
  async fn race_odds(&self, id: Uuid) -> anyhow::Result<Option<RaceOdds>>;

  async fn ticket(&self, id: Uuid) -> anyhow::Result<Option<Ticket>>;

  async fn tickets(&self, query: &TicketQuery) -> anyhow::Result<Vec<Ticket>>;

  /// Tickets holding at least one bet on `race_id`.
  async fn tickets_for_race(&self, race_id: Uuid) -> anyhow::Result<Vec<Ticket>>;

  /// Approved, unprocessed tickets whose every bet is resolved.
  async fn settleable_tickets(&self) -> anyhow::Result<Vec<Ticket>>;

  async fn global_configuration(&self) -> anyhow::Result<GlobalConfiguration>;

  /// Apply all pending changes atomically.
  async fn commit(&self, changes: ChangeSet) -> anyhow::Result<()>;

  /// Check if the store is reachable.
  async fn is_healthy(&self) -> bool;
}
