//! Placed finish of a race: first, second and third.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Top three finishing positions of a race.
///
/// Positions are not required to be distinct dogs: the draw picks three
/// entries of the race sequence, which may repeat a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaceResult {
    pub first: u8,
    pub second: u8,
    pub third: u8,
}

impl RaceResult {
    pub const fn new(first: u8, second: u8, third: u8) -> Self {
        Self {
            first,
            second,
            third,
        }
    }

    /// Build a result from the leading three entries of `positions`.
    pub fn from_slice(positions: &[u8]) -> Result<Self, DomainError> {
        match positions {
            [first, second, third, ..] => Ok(Self::new(*first, *second, *third)),
            _ => Err(DomainError::InvalidResult(format!(
                "race result must contain at least 3 positions, got {}",
                positions.len()
            ))),
        }
    }

    pub fn is_winner(&self, selection: u8) -> bool {
        self.first == selection
    }

    pub fn is_in_top2(&self, selection: u8) -> bool {
        self.first == selection || self.second == selection
    }

    pub fn is_in_top3(&self, selection: u8) -> bool {
        self.is_in_top2(selection) || self.third == selection
    }

    pub const fn positions(&self) -> [u8; 3] {
        [self.first, self.second, self.third]
    }
}

impl std::fmt::Display for RaceResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.first, self.second, self.third)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_takes_leading_three() {
        let r = RaceResult::from_slice(&[4, 1, 6, 2]).unwrap();
        assert_eq!(r.positions(), [4, 1, 6]);
    }

    #[test]
    fn test_from_slice_too_short() {
        let err = RaceResult::from_slice(&[4, 1]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidResult(_)));
    }

    #[test]
    fn test_placement_predicates() {
        let r = RaceResult::new(3, 5, 1);
        assert!(r.is_winner(3));
        assert!(!r.is_winner(5));
        assert!(r.is_in_top2(5));
        assert!(!r.is_in_top2(1));
        assert!(r.is_in_top3(1));
        assert!(!r.is_in_top3(6));
    }

    #[test]
    fn test_display() {
        assert_eq!(RaceResult::new(2, 4, 6).to_string(), "2-4-6");
    }
}
