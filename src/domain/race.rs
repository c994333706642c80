//! Race entity and its lifecycle state machine.
//!
//! ```text
//! Scheduled --close_betting--> BettingClosed --start_race--> Running --finish_race--> Finished
//! ```
//!
//! The result is drawn exactly once, when betting closes, and is
//! published to the race's bets when the race finishes. Transitions only
//! move forward; an out-of-order call fails without touching state.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bet::Bet;
use super::error::DomainError;
use super::names::generate_race_name;
use super::odds::{OddsModel, RaceOdds, build_race_odds};
use super::result::RaceResult;
use super::sequence::{SEQUENCE_LENGTH, generate_sequence, is_valid_sequence};

/// Lifecycle stage of a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RaceStatus {
    Scheduled,
    BettingClosed,
    Running,
    Finished,
}

impl std::fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "Scheduled"),
            Self::BettingClosed => write!(f, "BettingClosed"),
            Self::Running => write!(f, "Running"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

/// A six-dog race with its own outcome sequence and odds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Race {
    pub id: Uuid,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    status: RaceStatus,
    is_active: bool,
    sequence: Vec<u8>,
    result: Option<RaceResult>,
    result_determined_at: Option<DateTime<Utc>>,
    result_published_at: Option<DateTime<Utc>>,
    odds: Vec<RaceOdds>,
}

impl Race {
    /// Schedule a new race with a freshly drawn sequence, name and odds.
    pub fn schedule<R: Rng + ?Sized>(
        start_time: DateTime<Utc>,
        duration_secs: i64,
        model: OddsModel,
        rng: &mut R,
    ) -> Result<Self, DomainError> {
        let sequence = generate_sequence(rng);
        let name = generate_race_name(rng);
        Self::build(start_time, duration_secs, sequence, name, model)
    }

    /// Schedule a race over a caller-supplied sequence.
    ///
    /// The sequence must still be 100 values in `1..=6` with no triple.
    pub fn with_sequence(
        start_time: DateTime<Utc>,
        duration_secs: i64,
        sequence: Vec<u8>,
        model: OddsModel,
    ) -> Result<Self, DomainError> {
        if !is_valid_sequence(&sequence) {
            return Err(DomainError::InvalidArgument(format!(
                "race sequence must be {SEQUENCE_LENGTH} values in 1..=6 without three consecutive repeats"
            )));
        }
        let name = format!("Race at {}", start_time.format("%H:%M:%S"));
        Self::build(start_time, duration_secs, sequence, name, model)
    }

    fn build(
        start_time: DateTime<Utc>,
        duration_secs: i64,
        sequence: Vec<u8>,
        name: String,
        model: OddsModel,
    ) -> Result<Self, DomainError> {
        if duration_secs <= 0 {
            return Err(DomainError::InvalidArgument(format!(
                "race duration must be positive, got {duration_secs}s"
            )));
        }

        let id = Uuid::new_v4();
        let odds = build_race_odds(id, &sequence, model);

        Ok(Self {
            id,
            name,
            start_time,
            end_time: start_time + Duration::seconds(duration_secs),
            created_at: Utc::now(),
            status: RaceStatus::Scheduled,
            is_active: true,
            sequence,
            result: None,
            result_determined_at: None,
            result_published_at: None,
            odds,
        })
    }

    pub const fn status(&self) -> RaceStatus {
        self.status
    }

    /// True only while the race is still open for betting.
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub const fn result(&self) -> Option<RaceResult> {
        self.result
    }

    pub const fn result_determined_at(&self) -> Option<DateTime<Utc>> {
        self.result_determined_at
    }

    pub const fn result_published_at(&self) -> Option<DateTime<Utc>> {
        self.result_published_at
    }

    pub fn odds(&self) -> &[RaceOdds] {
        &self.odds
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// Close betting and draw the result.
    ///
    /// Three entries are taken from a shuffle of the sequence, so the
    /// same dog may appear in more than one position.
    pub fn close_betting<R: Rng + ?Sized>(
        &mut self,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<RaceResult, DomainError> {
        if self.status != RaceStatus::Scheduled {
            return Err(DomainError::transition("race", self.status, "close betting for"));
        }

        let mut draw = self.sequence.clone();
        let (picked, _) = draw.partial_shuffle(rng, 3);
        let result = RaceResult::from_slice(picked)?;

        self.is_active = false;
        self.status = RaceStatus::BettingClosed;
        self.result = Some(result);
        self.result_determined_at = Some(now);
        Ok(result)
    }

    pub fn start_race(&mut self) -> Result<(), DomainError> {
        if self.status != RaceStatus::BettingClosed {
            return Err(DomainError::transition("race", self.status, "start"));
        }
        self.status = RaceStatus::Running;
        Ok(())
    }

    /// Finish the race and resolve every bet placed on it.
    ///
    /// Bets for other races are ignored. Returns the number of bets
    /// resolved by this call.
    pub fn finish_race<'a>(
        &mut self,
        now: DateTime<Utc>,
        bets: impl IntoIterator<Item = &'a mut Bet>,
    ) -> Result<usize, DomainError> {
        if self.status != RaceStatus::Running {
            return Err(DomainError::transition("race", self.status, "finish"));
        }
        let result = self
            .result
            .ok_or_else(|| DomainError::InvalidState(format!("race {} has no result", self.id)))?;

        let positions = result.positions();
        let mut resolved = 0;
        for bet in bets.into_iter().filter(|b| b.race_id == self.id) {
            if !bet.is_resolved() {
                bet.process_result(&positions)?;
                resolved += 1;
            }
        }

        self.status = RaceStatus::Finished;
        self.result_published_at = Some(now);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bet::BetType;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal_macros::dec;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    fn scheduled() -> Race {
        Race::schedule(Utc::now(), 30, OddsModel::Simulated, &mut rng()).unwrap()
    }

    #[test]
    fn test_schedule_defaults() {
        let race = scheduled();
        assert_eq!(race.status(), RaceStatus::Scheduled);
        assert!(race.is_active());
        assert!(is_valid_sequence(race.sequence()));
        assert_eq!(race.end_time - race.start_time, Duration::seconds(30));
        assert!(race.result().is_none());
        assert_eq!(race.odds().len(), 18);
        assert!(race.odds().iter().all(|o| o.race_id == race.id));
        assert!(race.name.contains(" at "));
    }

    #[test]
    fn test_schedule_rejects_non_positive_duration() {
        let err = Race::schedule(Utc::now(), 0, OddsModel::Simulated, &mut rng()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn test_with_sequence_validates() {
        let bad = vec![1; 100];
        assert!(Race::with_sequence(Utc::now(), 10, bad, OddsModel::Frequency).is_err());

        let good: Vec<u8> = (0..100).map(|i| (i % 6) as u8 + 1).collect();
        let race = Race::with_sequence(Utc::now(), 10, good, OddsModel::Frequency).unwrap();
        assert_eq!(race.odds().len(), 6);
    }

    #[test]
    fn test_close_betting_draws_result_once() {
        let mut race = scheduled();
        let now = Utc::now();
        let result = race.close_betting(now, &mut rng()).unwrap();

        assert_eq!(race.status(), RaceStatus::BettingClosed);
        assert!(!race.is_active());
        assert_eq!(race.result(), Some(result));
        assert_eq!(race.result_determined_at(), Some(now));
        assert!(result.positions().iter().all(|p| (1..=6).contains(p)));

        let err = race.close_betting(now, &mut rng()).unwrap_err();
        assert!(err.is_transition());
        assert_eq!(race.result(), Some(result));
    }

    #[test]
    fn test_out_of_order_transitions_fail_without_mutation() {
        let mut race = scheduled();
        assert!(race.start_race().unwrap_err().is_transition());
        assert!(race.finish_race(Utc::now(), []).unwrap_err().is_transition());
        assert_eq!(race.status(), RaceStatus::Scheduled);
        assert!(race.is_active());
    }

    #[test]
    fn test_full_lifecycle_resolves_own_bets_only() {
        let mut race = scheduled();
        let now = Utc::now();
        let result = race.close_betting(now, &mut rng()).unwrap();
        race.start_race().unwrap();

        let ticket = Uuid::new_v4();
        let mut mine = Bet::new(race.id, ticket, result.first, BetType::Winner, dec!(2.5)).unwrap();
        let mut other = Bet::new(Uuid::new_v4(), ticket, 1, BetType::Top3, dec!(1.5)).unwrap();

        let resolved = race.finish_race(now, [&mut mine, &mut other]).unwrap();
        assert_eq!(resolved, 1);
        assert_eq!(mine.is_winning, Some(true));
        assert_eq!(other.is_winning, None);
        assert_eq!(race.status(), RaceStatus::Finished);
        assert_eq!(race.result_published_at(), Some(now));

        assert!(race.start_race().unwrap_err().is_transition());
        assert_eq!(race.result(), Some(result));
    }

    #[test]
    fn test_started_and_ended() {
        let start = Utc::now();
        let race = Race::schedule(start, 10, OddsModel::Simulated, &mut rng()).unwrap();
        assert!(!race.has_started(start - Duration::seconds(1)));
        assert!(race.has_started(start));
        assert!(!race.has_ended(start + Duration::seconds(9)));
        assert!(race.has_ended(start + Duration::seconds(10)));
    }
}
