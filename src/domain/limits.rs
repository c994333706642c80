//! Exchange-wide betting limits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// The single global configuration row read by placement and pooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfiguration {
    /// Minimum stake per ticket.
    pub min_ticket_stake: Decimal,
    /// Maximum amount a single ticket may win.
    pub max_ticket_win: Decimal,
    /// Minimum number of races kept open for betting.
    pub min_active_races: usize,
}

impl Default for GlobalConfiguration {
    fn default() -> Self {
        Self {
            min_ticket_stake: dec!(1.00),
            max_ticket_win: dec!(10000.00),
            min_active_races: 7,
        }
    }
}
