//! In-Memory Store - `Store` Port Backed by Indexed Maps
//!
//! All state sits behind one `tokio::sync::RwLock`, so a `commit`
//! is atomic with respect to every reader. Two indexes avoid scanning
//! bets on each tick:
//! - race id -> tickets holding a bet on that race
//! - open ticket id -> number of races it still waits on
//!
//! An open ticket is approved and unprocessed; it becomes settleable
//! when its pending race count reaches zero.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{GlobalConfiguration, Race, RaceOdds, RaceStatus, Ticket, TicketStatus};
use crate::ports::store::{ChangeSet, Store, TicketQuery, WriteConflict};

use super::state::{SNAPSHOT_VERSION, StoreSnapshot};

#[derive(Default)]
struct StoreState {
    configuration: GlobalConfiguration,
    races: HashMap<Uuid, Race>,
    odds: HashMap<Uuid, RaceOdds>,
    tickets: HashMap<Uuid, Ticket>,
    tickets_by_race: HashMap<Uuid, BTreeSet<Uuid>>,
    pending_races: HashMap<Uuid, usize>,
}

impl StoreState {
    fn put_race(&mut self, race: Race) {
        for row in race.odds() {
            self.odds.insert(row.id, row.clone());
        }
        self.races.insert(race.id, race);
    }

    fn put_ticket(&mut self, ticket: Ticket) {
        for race_id in ticket.race_ids() {
            self.tickets_by_race.entry(race_id).or_default().insert(ticket.id);
        }
        self.reindex_ticket(&ticket);
        self.tickets.insert(ticket.id, ticket);
    }

    fn reindex_ticket(&mut self, ticket: &Ticket) {
        if ticket.status() == TicketStatus::Success && ticket.processed_at().is_none() {
            self.pending_races
                .insert(ticket.id, ticket.pending_race_ids().len());
        } else {
            self.pending_races.remove(&ticket.id);
        }
    }

    fn sorted_by_start(mut races: Vec<Race>) -> Vec<Race> {
        races.sort_by_key(|r| (r.start_time, r.id));
        races
    }

    fn races_where(&self, pred: impl Fn(&Race) -> bool) -> Vec<Race> {
        Self::sorted_by_start(self.races.values().filter(|r| pred(r)).cloned().collect())
    }

    /// Reject changes that would overwrite newer stored state.
    ///
    /// - a race write must advance the stored status and keep its result
    /// - a settled ticket is never rewritten
    /// - a new ticket needs every race it bets on open for betting
    fn check(&self, changes: &ChangeSet) -> Result<()> {
        for race in &changes.races {
            if let Some(stored) = self.races.get(&race.id) {
                if race.status() <= stored.status() {
                    return Err(WriteConflict::RaceStatus {
                        race_id: race.id,
                        stored: stored.status(),
                        attempted: race.status(),
                    }
                    .into());
                }
                if stored.result().is_some() && race.result() != stored.result() {
                    return Err(WriteConflict::RaceResult(race.id).into());
                }
            }
        }

        for ticket in &changes.tickets {
            match self.tickets.get(&ticket.id) {
                Some(stored) if stored.processed_at().is_some() => {
                    return Err(WriteConflict::TicketSettled(ticket.id).into());
                }
                Some(_) => {}
                None if ticket.status() == TicketStatus::Success => {
                    self.check_races_open(changes, ticket)?;
                }
                None => {}
            }
        }

        for outcome in &changes.bet_outcomes {
            let in_batch = changes.tickets.iter().find(|t| t.id == outcome.ticket_id);
            let ticket = in_batch.or_else(|| self.tickets.get(&outcome.ticket_id));
            let Some(ticket) = ticket else {
                bail!("bet outcome for unknown ticket {}", outcome.ticket_id);
            };
            if !ticket.bets().iter().any(|b| b.id == outcome.bet_id) {
                bail!(
                    "bet outcome for unknown bet {} on ticket {}",
                    outcome.bet_id,
                    outcome.ticket_id
                );
            }
        }
        Ok(())
    }

    /// Every race a new ticket bets on must still be scheduled, as of
    /// this commit.
    fn check_races_open(&self, changes: &ChangeSet, ticket: &Ticket) -> Result<()> {
        for race_id in ticket.race_ids() {
            let in_batch = changes.races.iter().find(|r| r.id == race_id);
            let Some(race) = in_batch.or_else(|| self.races.get(&race_id)) else {
                bail!("ticket {} references unknown race {race_id}", ticket.id);
            };
            if race.status() != RaceStatus::Scheduled {
                return Err(WriteConflict::BettingClosed {
                    ticket_id: ticket.id,
                    race_id,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// `Store` implementation holding everything in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new(configuration: GlobalConfiguration) -> Self {
        Self {
            state: RwLock::new(StoreState {
                configuration,
                ..StoreState::default()
            }),
        }
    }

    /// Rebuild a store, and its indexes, from a saved snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut state = StoreState {
            configuration: snapshot.configuration,
            ..StoreState::default()
        };
        for race in snapshot.races {
            state.put_race(race);
        }
        for ticket in snapshot.tickets {
            state.put_ticket(ticket);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Capture the full store contents.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        StoreSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            saved_at: Utc::now(),
            configuration: state.configuration.clone(),
            races: StoreState::sorted_by_start(state.races.values().cloned().collect()),
            tickets: state.tickets.values().cloned().collect(),
            wallet: None,
        }
    }

    pub async fn set_global_configuration(&self, configuration: GlobalConfiguration) {
        self.state.write().await.configuration = configuration;
    }

    pub async fn race_count(&self) -> usize {
        self.state.read().await.races.len()
    }

    pub async fn ticket_count(&self) -> usize {
        self.state.read().await.tickets.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn race(&self, id: Uuid) -> Result<Option<Race>> {
        Ok(self.state.read().await.races.get(&id).cloned())
    }

    async fn races_by_status(&self, status: RaceStatus) -> Result<Vec<Race>> {
        Ok(self.state.read().await.races_where(|r| r.status() == status))
    }

    async fn races_starting_before(&self, status: RaceStatus, cutoff: DateTime<Utc>) -> Result<Vec<Race>> {
        Ok(self
            .state
            .read()
            .await
            .races_where(|r| r.status() == status && r.start_time <= cutoff))
    }

    async fn running_races_ending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Race>> {
        Ok(self
            .state
            .read()
            .await
            .races_where(|r| r.status() == RaceStatus::Running && r.end_time <= cutoff))
    }

    async fn active_races(&self) -> Result<Vec<Race>> {
        Ok(self.state.read().await.races_where(Race::is_active))
    }

    async fn active_race_count(&self) -> Result<usize> {
        Ok(self
            .state
            .read()
            .await
            .races
            .values()
            .filter(|r| r.is_active())
            .count())
    }

    async fn latest_scheduled_race(&self) -> Result<Option<Race>> {
        Ok(self
            .state
            .read()
            .await
            .races
            .values()
            .filter(|r| r.status() == RaceStatus::Scheduled)
            .max_by_key(|r| r.end_time)
            .cloned())
    }

    async fn race_odds(&self, id: Uuid) -> Result<Option<RaceOdds>> {
        Ok(self.state.read().await.odds.get(&id).cloned())
    }

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        Ok(self.state.read().await.tickets.get(&id).cloned())
    }

    async fn tickets(&self, query: &TicketQuery) -> Result<Vec<Ticket>> {
        let state = self.state.read().await;
        let mut tickets: Vec<&Ticket> = state
            .tickets
            .values()
            .filter(|t| query.status.is_none_or(|s| t.status() == s))
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(tickets
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn tickets_for_race(&self, race_id: Uuid) -> Result<Vec<Ticket>> {
        let state = self.state.read().await;
        Ok(state
            .tickets_by_race
            .get(&race_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.tickets.get(id).cloned())
            .collect())
    }

    async fn settleable_tickets(&self) -> Result<Vec<Ticket>> {
        let state = self.state.read().await;
        let mut ready: Vec<Ticket> = state
            .pending_races
            .iter()
            .filter(|(_, pending)| **pending == 0)
            .filter_map(|(id, _)| state.tickets.get(id).cloned())
            .collect();
        ready.sort_by_key(|t| (t.created_at, t.id));
        Ok(ready)
    }

    async fn global_configuration(&self) -> Result<GlobalConfiguration> {
        Ok(self.state.read().await.configuration.clone())
    }

    #[instrument(skip(self, changes), fields(
        races = changes.races.len(),
        tickets = changes.tickets.len(),
        outcomes = changes.bet_outcomes.len()
    ))]
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(&changes)?;

        let ChangeSet {
            races,
            tickets,
            bet_outcomes,
        } = changes;
        for race in races {
            state.put_race(race);
        }
        for ticket in tickets {
            state.put_ticket(ticket);
        }

        let mut touched = BTreeSet::new();
        for outcome in bet_outcomes {
            if let Some(ticket) = state.tickets.get_mut(&outcome.ticket_id) {
                if let Some(bet) = ticket.bets_mut().find(|b| b.id == outcome.bet_id) {
                    if bet.is_winning.is_none() {
                        bet.is_winning = Some(outcome.is_winning);
                        touched.insert(outcome.ticket_id);
                    }
                }
            }
        }
        for id in touched {
            if let Some(ticket) = state.tickets.get(&id).cloned() {
                state.reindex_ticket(&ticket);
            }
        }

        debug!("Changes committed");
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
