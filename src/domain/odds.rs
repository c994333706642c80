//! Odds Engine - Price derivation from a race's random sequence
//!
//! Two models are supported:
//!
//! - **Frequency**: Winner odds only. For each selection,
//!   `p = occurrences / 100` and `odds = 1 / p`, capped at 90 when the
//!   selection never occurs.
//! - **Simulated**: the sequence is cut into consecutive groups of three,
//!   each read as a (1st, 2nd, 3rd) finish. For each selection and bet
//!   type, `odds = total / successes`, floored at 1.05, or 99 when the
//!   selection never satisfies the bet type.
//!
//! All odds are rounded to two decimal places before they are stored.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bet::BetType;
use super::result::RaceResult;
use super::sequence::{SELECTION_COUNT, frequencies};

/// Odds for a selection that never appears in the frequency model.
pub const UNSEEN_FREQUENCY_ODDS: Decimal = dec!(90);

/// Odds for an outcome with zero simulated successes.
pub const UNSEEN_SIMULATED_ODDS: Decimal = dec!(99);

/// Lowest odds the simulated model will quote.
pub const MIN_SIMULATED_ODDS: Decimal = dec!(1.05);

/// Decimal places odds are stored with.
const ODDS_SCALE: u32 = 2;

/// Which derivation produces a race's odds rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OddsModel {
    /// One Winner row per selection from raw frequency.
    Frequency,
    /// Winner, Top2 and Top3 rows from simulated groupings.
    #[default]
    Simulated,
}

/// A quoted price for one (race, selection, bet type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceOdds {
    pub id: Uuid,
    pub race_id: Uuid,
    pub selection: u8,
    pub bet_type: BetType,
    pub odds: Decimal,
}

impl RaceOdds {
    pub fn display(&self) -> String {
        format!("Selection {} ({}): {}", self.selection, self.bet_type, self.odds)
    }
}

/// Frequency-model Winner odds, indexed by `selection - 1`.
pub fn frequency_odds(sequence: &[u8]) -> [Decimal; SELECTION_COUNT as usize] {
    let total = Decimal::from(sequence.len());
    frequencies(sequence).map(|count| {
        if count == 0 {
            UNSEEN_FREQUENCY_ODDS
        } else {
            (total / Decimal::from(count)).round_dp(ODDS_SCALE)
        }
    })
}

/// Read the sequence as consecutive simulated finishes; a trailing
/// partial group is discarded.
pub fn simulated_results(sequence: &[u8]) -> Vec<RaceResult> {
    sequence
        .chunks_exact(3)
        .map(|g| RaceResult::new(g[0], g[1], g[2]))
        .collect()
}

/// Price an outcome seen `successes` times out of `total` simulations.
pub fn odds_from_success_count(successes: usize, total: usize) -> Decimal {
    if successes == 0 || total == 0 {
        return UNSEEN_SIMULATED_ODDS;
    }

    let raw = Decimal::from(total) / Decimal::from(successes);
    raw.max(MIN_SIMULATED_ODDS).round_dp(ODDS_SCALE)
}

/// Simulated odds for one selection and bet type.
pub fn simulated_odds(results: &[RaceResult], selection: u8, bet_type: BetType) -> Decimal {
    let successes = results
        .iter()
        .filter(|r| bet_type.wins(selection, r))
        .count();
    odds_from_success_count(successes, results.len())
}

/// Build every odds row for a race under the chosen model.
pub fn build_race_odds(race_id: Uuid, sequence: &[u8], model: OddsModel) -> Vec<RaceOdds> {
    let row = |selection: u8, bet_type: BetType, odds: Decimal| RaceOdds {
        id: Uuid::new_v4(),
        race_id,
        selection,
        bet_type,
        odds,
    };

    match model {
        OddsModel::Frequency => frequency_odds(sequence)
            .into_iter()
            .zip(1..=SELECTION_COUNT)
            .map(|(odds, selection)| row(selection, BetType::Winner, odds))
            .collect(),
        OddsModel::Simulated => {
            let results = simulated_results(sequence);
            BetType::ALL
                .into_iter()
                .flat_map(|bet_type| {
                    (1..=SELECTION_COUNT).map(move |selection| (selection, bet_type))
                })
                .map(|(selection, bet_type)| {
                    row(selection, bet_type, simulated_odds(&results, selection, bet_type))
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cyclic_sequence() -> Vec<u8> {
        (0..100).map(|i| (i % 6) as u8 + 1).collect()
    }

    #[test]
    fn test_frequency_odds_from_counts() {
        // 1..=4 appear 17 times, 5 and 6 appear 16 times
        let odds = frequency_odds(&cyclic_sequence());
        assert_eq!(odds[0], dec!(5.88));
        assert_eq!(odds[5], dec!(6.25));
    }

    #[test]
    fn test_frequency_odds_unseen_selection() {
        let seq: Vec<u8> = (0..100).map(|i| (i % 5) as u8 + 1).collect();
        let odds = frequency_odds(&seq);
        assert_eq!(odds[4], dec!(5));
        assert_eq!(odds[5], UNSEEN_FREQUENCY_ODDS);
    }

    #[test]
    fn test_simulated_results_drop_remainder() {
        let results = simulated_results(&cyclic_sequence());
        assert_eq!(results.len(), 33);
        assert_eq!(results[0], RaceResult::new(1, 2, 3));
        assert_eq!(results[1], RaceResult::new(4, 5, 6));
    }

    #[test]
    fn test_odds_from_success_count() {
        assert_eq!(odds_from_success_count(0, 33), dec!(99));
        assert_eq!(odds_from_success_count(11, 33), dec!(3));
        assert_eq!(odds_from_success_count(10, 33), dec!(3.30));
        // 33 of 33 floors at 1.05
        assert_eq!(odds_from_success_count(33, 33), dec!(1.05));
    }

    #[test]
    fn test_simulated_model_row_count() {
        let rows = build_race_odds(Uuid::new_v4(), &cyclic_sequence(), OddsModel::Simulated);
        assert_eq!(rows.len(), 18);
        for bet_type in BetType::ALL {
            assert_eq!(rows.iter().filter(|r| r.bet_type == bet_type).count(), 6);
        }
    }

    #[test]
    fn test_frequency_model_is_winner_only() {
        let rows = build_race_odds(Uuid::new_v4(), &cyclic_sequence(), OddsModel::Frequency);
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.bet_type == BetType::Winner));
    }

    #[test]
    fn test_all_odds_above_one() {
        for model in [OddsModel::Frequency, OddsModel::Simulated] {
            let rows = build_race_odds(Uuid::new_v4(), &cyclic_sequence(), model);
            assert!(rows.iter().all(|r| r.odds > Decimal::ONE));
        }
    }

    #[test]
    fn test_top_odds_never_exceed_winner_odds() {
        let results = simulated_results(&cyclic_sequence());
        for selection in 1..=6 {
            let winner = simulated_odds(&results, selection, BetType::Winner);
            let top2 = simulated_odds(&results, selection, BetType::Top2);
            let top3 = simulated_odds(&results, selection, BetType::Top3);
            assert!(top2 <= winner);
            assert!(top3 <= top2);
        }
    }

    #[test]
    fn test_display_string() {
        let row = RaceOdds {
            id: Uuid::nil(),
            race_id: Uuid::nil(),
            selection: 4,
            bet_type: BetType::Top2,
            odds: dec!(3.30),
        };
        assert_eq!(row.display(), "Selection 4 (Top2): 3.30");
    }
}
