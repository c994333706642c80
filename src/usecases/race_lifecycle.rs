//! Race Lifecycle Use Case - Time-Driven Race Transitions
//!
//! Advances races through `Scheduled -> BettingClosed -> Running ->
//! Finished` and keeps a minimum pool of races open for betting.
//!
//! Tick flow:
//! 1. Close betting on scheduled races starting within the lead time
//! 2. Start races whose start time has passed
//! 3. Finish races whose end time has passed, resolving their bets
//! 4. Top up the pool of active races
//!
//! Batch steps isolate each race: a transition whose precondition no
//! longer holds is skipped, any other per-race failure is logged, and
//! the rest of the batch still runs. Successful changes from one step
//! are persisted with a single store commit; if the store rejects it,
//! each race is committed on its own so one conflicting race cannot
//! take its siblings down. A failed step never stops the later ones.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{OddsModel, Race, RaceStatus};
use crate::error::{ExchangeError, ExchangeResult};
use crate::ports::store::{BetOutcome, ChangeSet, Store};

/// Timing knobs for race creation and betting closure.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
  /// Betting closes this long before a race starts.
  pub betting_close_lead: Duration,
  /// Length of every race.
  pub race_duration_secs: i64,
  /// Gap between the end of one race and the start of the next.
  pub race_interval: Duration,
  /// Odds derivation for new races.
  pub odds_model: OddsModel,
}

impl Default for LifecycleSettings {
  fn default() -> Self {
    Self {
      betting_close_lead: Duration::seconds(5),
      race_duration_secs: 10,
      race_interval: Duration::seconds(5),
      odds_model: OddsModel::Simulated,
    }
  }
}

/// Lifecycle step a batch report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
  BettingClosure,
  RaceStart,
  RaceFinish,
}

impl Stage {
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::BettingClosure => "close_betting",
      Self::RaceStart => "start",
      Self::RaceFinish => "finish",
    }
  }
}

/// Outcome of one batch transition step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
  pub stage: Stage,
  /// Races that were due.
  pub processed: usize,
  /// Races that moved to the next state.
  pub transitioned: usize,
  /// Races whose precondition no longer held.
  pub skipped: usize,
  /// Races that failed for any other reason.
  pub failed: usize,
}

impl TransitionReport {
  const fn new(stage: Stage, processed: usize) -> Self {
    Self {
      stage,
      processed,
      transitioned: 0,
      skipped: 0,
      failed: 0,
    }
  }
}

/// Outcome of a pool top-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
  pub active_before: usize,
  pub created: usize,
  pub active_after: usize,
}

/// Everything one lifecycle tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleTick {
  pub closures: TransitionReport,
  pub starts: TransitionReport,
  pub finishes: TransitionReport,
  pub pool: PoolReport,
  /// Steps that could not run at all, as `stage: error`.
  pub errors: Vec<String>,
}

impl LifecycleTick {
  /// No step errored and no race failed.
  pub fn is_clean(&self) -> bool {
    self.errors.is_empty()
      && [&self.closures, &self.starts, &self.finishes]
        .iter()
        .all(|r| r.failed == 0)
  }
}

/// Earliest start for the next race in the chain.
pub fn next_start_time(
  latest_scheduled_end: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
  interval: Duration,
) -> DateTime<Utc> {
  let floor = now + interval;
  latest_scheduled_end.map_or(floor, |end| (end + interval).max(floor))
}

/// Race lifecycle service over a `Store`.
pub struct RaceLifecycle<S: Store> {
  store: Arc<S>,
  settings: LifecycleSettings,
  rng: Mutex<StdRng>,
}

impl<S: Store> RaceLifecycle<S> {
  /// Create with an entropy-seeded RNG.
  pub fn new(store: Arc<S>, settings: LifecycleSettings) -> Self {
    Self::with_rng(store, settings, StdRng::from_entropy())
  }

  /// Create with a fixed seed for reproducible races.
  pub fn with_seed(store: Arc<S>, settings: LifecycleSettings, seed: u64) -> Self {
    Self::with_rng(store, settings, StdRng::seed_from_u64(seed))
  }

  pub fn with_rng(store: Arc<S>, settings: LifecycleSettings, rng: StdRng) -> Self {
    Self {
      store,
      settings,
      rng: Mutex::new(rng),
    }
  }

  pub const fn settings(&self) -> &LifecycleSettings {
    &self.settings
  }

  // ── Explicit single-race operations ──

  async fn load(&self, race_id: Uuid) -> ExchangeResult<Race> {
    self
      .store
      .race(race_id)
      .await?
      .ok_or_else(|| ExchangeError::not_found("race", race_id))
  }

  /// Close betting on one race and draw its result.
  #[instrument(skip(self))]
  pub async fn close_betting_for_race(&self, race_id: Uuid, now: DateTime<Utc>) -> ExchangeResult<Race> {
    let mut race = self.load(race_id).await?;
    self.close(&mut race, now)?;
    self.store.commit(ChangeSet::with_race(race.clone())).await?;
    Ok(race)
  }

  #[instrument(skip(self))]
  pub async fn start_race(&self, race_id: Uuid) -> ExchangeResult<Race> {
    let mut race = self.load(race_id).await?;
    race.start_race()?;
    info!(race_id = %race.id, "Race started");
    self.store.commit(ChangeSet::with_race(race.clone())).await?;
    Ok(race)
  }

  /// Finish one race and resolve every bet placed on it.
  #[instrument(skip(self))]
  pub async fn finish_race(&self, race_id: Uuid, now: DateTime<Utc>) -> ExchangeResult<Race> {
    let mut race = self.load(race_id).await?;
    let outcomes = self.finish(&mut race, now).await?;

    let mut changes = ChangeSet::with_race(race.clone());
    changes.bet_outcomes = outcomes;
    self.store.commit(changes).await?;
    Ok(race)
  }

  fn close(&self, race: &mut Race, now: DateTime<Utc>) -> ExchangeResult<()> {
    let result = {
      let mut rng = self.rng.lock();
      race.close_betting(now, &mut *rng)?
    };
    info!(race_id = %race.id, result = %result, "Betting closed, result drawn");
    Ok(())
  }

  async fn finish(&self, race: &mut Race, now: DateTime<Utc>) -> ExchangeResult<Vec<BetOutcome>> {
    let mut tickets = self.store.tickets_for_race(race.id).await?;
    let resolved = race.finish_race(now, tickets.iter_mut().flat_map(|t| t.bets_mut()))?;

    let outcomes: Vec<BetOutcome> = tickets
      .iter()
      .flat_map(|t| t.bets())
      .filter(|b| b.race_id == race.id)
      .filter_map(|b| {
        b.is_winning.map(|is_winning| BetOutcome {
          ticket_id: b.ticket_id,
          bet_id: b.id,
          is_winning,
        })
      })
      .collect();

    info!(
      race_id = %race.id,
      bets_resolved = resolved,
      winning = outcomes.iter().filter(|o| o.is_winning).count(),
      "Race finished"
    );
    Ok(outcomes)
  }

  // ── Batch operations used by the scheduler ──

  fn record(report: &mut TransitionReport, race_id: Uuid, outcome: ExchangeResult<()>) -> bool {
    match outcome {
      Ok(()) => {
        report.transitioned += 1;
        true
      }
      Err(e) if e.is_transition() || e.is_write_conflict() => {
        debug!(race_id = %race_id, stage = report.stage.as_str(), reason = %e, "Transition skipped");
        report.skipped += 1;
        false
      }
      Err(e) => {
        error!(race_id = %race_id, stage = report.stage.as_str(), error = %e, "Transition failed");
        report.failed += 1;
        false
      }
    }
  }

  /// Persist one change set per transitioned race.
  ///
  /// A race whose own commit is rejected moves from `transitioned` to
  /// `skipped` or `failed`.
  async fn persist(&self, report: &mut TransitionReport, pending: Vec<(Uuid, ChangeSet)>) {
    if pending.is_empty() {
      return;
    }

    let mut batch = ChangeSet::default();
    for (_, changes) in &pending {
      batch.merge(changes.clone());
    }
    let Err(e) = self.store.commit(batch).await else {
      return;
    };
    warn!(
      stage = report.stage.as_str(),
      races = pending.len(),
      error = %e,
      "Batch commit rejected, committing races one by one"
    );

    for (race_id, changes) in pending {
      if let Err(e) = self.store.commit(changes).await {
        report.transitioned -= 1;
        Self::record(report, race_id, Err(e.into()));
      }
    }
  }

  /// Close betting on every scheduled race starting within the lead time.
  #[instrument(skip(self))]
  pub async fn process_betting_closures(&self, now: DateTime<Utc>) -> ExchangeResult<TransitionReport> {
    let cutoff = now + self.settings.betting_close_lead;
    let due = self
      .store
      .races_starting_before(RaceStatus::Scheduled, cutoff)
      .await?;

    let mut report = TransitionReport::new(Stage::BettingClosure, due.len());
    let mut pending = Vec::new();
    for mut race in due {
      let outcome = self.close(&mut race, now);
      if Self::record(&mut report, race.id, outcome) {
        pending.push((race.id, ChangeSet::with_race(race)));
      }
    }

    self.persist(&mut report, pending).await;
    Ok(report)
  }

  /// Start every betting-closed race whose start time has passed.
  #[instrument(skip(self))]
  pub async fn process_race_starts(&self, now: DateTime<Utc>) -> ExchangeResult<TransitionReport> {
    let due = self
      .store
      .races_starting_before(RaceStatus::BettingClosed, now)
      .await?;

    let mut report = TransitionReport::new(Stage::RaceStart, due.len());
    let mut pending = Vec::new();
    for mut race in due {
      let outcome = race.start_race().map_err(ExchangeError::from);
      if Self::record(&mut report, race.id, outcome) {
        debug!(race_id = %race.id, "Race started");
        pending.push((race.id, ChangeSet::with_race(race)));
      }
    }

    self.persist(&mut report, pending).await;
    Ok(report)
  }

  /// Finish every running race whose end time has passed.
  #[instrument(skip(self))]
  pub async fn process_race_finishes(&self, now: DateTime<Utc>) -> ExchangeResult<TransitionReport> {
    let due = self.store.running_races_ending_before(now).await?;

    let mut report = TransitionReport::new(Stage::RaceFinish, due.len());
    let mut pending = Vec::new();
    for mut race in due {
      let race_id = race.id;
      match self.finish(&mut race, now).await {
        Ok(outcomes) => {
          Self::record(&mut report, race_id, Ok(()));
          let mut changes = ChangeSet::with_race(race);
          changes.bet_outcomes = outcomes;
          pending.push((race_id, changes));
        }
        Err(e) => {
          Self::record(&mut report, race_id, Err(e));
        }
      }
    }

    self.persist(&mut report, pending).await;
    Ok(report)
  }

  // ── Pool maintenance ──

  /// Schedule one race after the latest scheduled race.
  #[instrument(skip(self))]
  pub async fn create_scheduled_race(&self, now: DateTime<Utc>) -> ExchangeResult<Race> {
    let latest_end = self
      .store
      .latest_scheduled_race()
      .await?
      .map(|r| r.end_time);
    let start = next_start_time(latest_end, now, self.settings.race_interval);

    let race = {
      let mut rng = self.rng.lock();
      Race::schedule(
        start,
        self.settings.race_duration_secs,
        self.settings.odds_model,
        &mut *rng,
      )?
    };

    self.store.commit(ChangeSet::with_race(race.clone())).await?;
    info!(
      race_id = %race.id,
      name = %race.name,
      start = %race.start_time,
      end = %race.end_time,
      "Race scheduled"
    );
    Ok(race)
  }

  /// Create races until the configured minimum are open for betting.
  #[instrument(skip(self))]
  pub async fn ensure_minimum_races(&self, now: DateTime<Utc>) -> ExchangeResult<PoolReport> {
    let minimum = self.store.global_configuration().await?.min_active_races;
    let active_before = self.store.active_race_count().await?;

    let mut created = 0;
    while active_before + created < minimum {
      self.create_scheduled_race(now).await?;
      created += 1;
    }

    if created > 0 {
      info!(active_before, created, minimum, "Race pool replenished");
    }
    Ok(PoolReport {
      active_before,
      created,
      active_after: active_before + created,
    })
  }

  pub async fn active_races(&self) -> ExchangeResult<Vec<Race>> {
    Ok(self.store.active_races().await?)
  }

  pub async fn active_race_count(&self) -> ExchangeResult<usize> {
    Ok(self.store.active_race_count().await?)
  }

  /// Run one full lifecycle tick in order.
  ///
  /// Every step runs even when an earlier one could not; step errors
  /// are collected in the returned tick.
  pub async fn tick(&self, now: DateTime<Utc>) -> LifecycleTick {
    let mut errors = Vec::new();
    let closures = Self::step(
      Stage::BettingClosure,
      self.process_betting_closures(now).await,
      &mut errors,
    );
    let starts = Self::step(Stage::RaceStart, self.process_race_starts(now).await, &mut errors);
    let finishes = Self::step(Stage::RaceFinish, self.process_race_finishes(now).await, &mut errors);
    let pool = self.ensure_minimum_races(now).await.unwrap_or_else(|e| {
      error!(error = %e, "Race pool top-up failed");
      errors.push(format!("pool: {e}"));
      PoolReport::default()
    });

    let tick = LifecycleTick {
      closures,
      starts,
      finishes,
      pool,
      errors,
    };
    if !tick.is_clean() {
      warn!(
        closures_failed = tick.closures.failed,
        starts_failed = tick.starts.failed,
        finishes_failed = tick.finishes.failed,
        step_errors = tick.errors.len(),
        "Lifecycle tick finished with failures"
      );
    }
    tick
  }

  fn step(stage: Stage, outcome: ExchangeResult<TransitionReport>, errors: &mut Vec<String>) -> TransitionReport {
    outcome.unwrap_or_else(|e| {
      error!(stage = stage.as_str(), error = %e, "Lifecycle step failed");
      errors.push(format!("{}: {e}", stage.as_str()));
      TransitionReport::new(stage, 0)
    })
  }
}
