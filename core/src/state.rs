//! Cross-round economic state, threaded from one round into the next.
//!
//! RULE: only the reducer mutates these. Each round receives the prior
//! round's state by value and returns the next round's state — there is
//! no shared mutable state between rounds or between matches.

use serde::{Deserialize, Serialize};

use crate::rules::Rules;
use crate::types::{SteamId, Team};

/// Per-player carried state. Created when a player is first seen in a
/// match, never deleted — a player who disconnects still has balances
/// emitted until match end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEconomicState {
    pub steamid: SteamId,
    pub team: Team,
    /// Current bank. Invariant: `0 <= bank <= rules.money_cap`.
    pub bank: i64,
    /// Current-round purchase total, reset at every round start.
    pub equipment_value: i64,
    /// Set when the player died after time expiry with the bomb
    /// unplanted on T side; consumed at the start of the next round.
    pub zero_income_next_round: bool,
}

impl PlayerEconomicState {
    pub fn initial(steamid: SteamId, team: Team, rules: &Rules) -> Self {
        Self {
            steamid,
            team,
            bank: rules.start_money,
            equipment_value: 0,
            zero_income_next_round: false,
        }
    }
}

/// Per-team carried state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEconomicState {
    pub team: Team,
    /// Consecutive rounds lost. Indexes the loss-bonus ladder; resets
    /// to 0 on a win.
    pub loss_streak: u32,
}

impl TeamEconomicState {
    pub fn initial(team: Team) -> Self {
        Self { team, loss_streak: 0 }
    }
}
