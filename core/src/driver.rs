//! The match driver — folds the round reducer over a whole match.
//!
//! RULES:
//!   - Rounds are strictly sequential within a match: round N's output
//!     state is round N+1's input state. No parallelism inside a match.
//!   - Matches are fully independent of each other; a batch keeps going
//!     past a failed match and reports it in the summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EconError, EconResult};
use crate::event::Event;
use crate::ordering::{order_events, partition_by_match, RoundGroup};
use crate::reducer::{reduce_round, BalanceRecord, TeamSnapshot};
use crate::rules::Rules;
use crate::state::{PlayerEconomicState, TeamEconomicState};
use crate::types::{MatchId, RoundNumber, SteamId, Team};

/// One row of carried state as persisted after each round: either a
/// team's loss streak or a player's zero-income flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRow {
    pub match_id: MatchId,
    pub round_number: RoundNumber,
    pub team: Option<Team>,
    pub player_steamid: Option<SteamId>,
    pub loss_streak_after: Option<u32>,
    pub zero_income_next_round: Option<bool>,
}

/// The three output tables for one match.
#[derive(Debug, Clone)]
pub struct MatchOutput {
    pub match_id: MatchId,
    pub balances: Vec<BalanceRecord>,
    pub snapshots: Vec<TeamSnapshot>,
    pub states: Vec<StateRow>,
}

/// Fold all rounds of one match in ascending round order.
pub fn reduce_match(
    match_id: &str,
    rounds: &[RoundGroup],
    rules: &Rules,
) -> EconResult<MatchOutput> {
    let mut team_states: BTreeMap<Team, TeamEconomicState> = BTreeMap::new();
    for team in [Team::T, Team::Ct] {
        team_states.insert(team, TeamEconomicState::initial(team));
    }
    let mut player_states: BTreeMap<SteamId, PlayerEconomicState> = BTreeMap::new();

    let mut output = MatchOutput {
        match_id: match_id.to_string(),
        balances: Vec::new(),
        snapshots: Vec::new(),
        states: Vec::new(),
    };

    for round in rounds {
        log::debug!("reducing match '{match_id}' round {}", round.round_number);
        let result = reduce_round(&team_states, &player_states, round, rules)?;

        output.balances.extend(result.balances);
        output.snapshots.extend(result.snapshots);

        for (team, state) in &result.team_states {
            output.states.push(StateRow {
                match_id: match_id.to_string(),
                round_number: round.round_number,
                team: Some(*team),
                player_steamid: None,
                loss_streak_after: Some(state.loss_streak),
                zero_income_next_round: None,
            });
        }
        for (steamid, state) in &result.player_states {
            output.states.push(StateRow {
                match_id: match_id.to_string(),
                round_number: round.round_number,
                team: None,
                player_steamid: Some(steamid.clone()),
                loss_streak_after: None,
                zero_income_next_round: Some(state.zero_income_next_round),
            });
        }

        team_states = result.team_states;
        player_states = result.player_states;
    }

    log::info!(
        "reduced match '{match_id}': {} rounds, {} balance rows, {} snapshots",
        rounds.len(),
        output.balances.len(),
        output.snapshots.len()
    );
    Ok(output)
}

/// Per-match outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<MatchId>,
    pub failed: Vec<(MatchId, EconError)>,
}

impl BatchSummary {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reduce every match found in an unordered event stream. A failing
/// match is recorded and skipped; the rest of the batch proceeds.
pub fn reduce_all(events: Vec<Event>, rules: &Rules) -> (Vec<MatchOutput>, BatchSummary) {
    let mut outputs = Vec::new();
    let mut summary = BatchSummary::default();

    for (match_id, match_events) in partition_by_match(events) {
        let result = order_events(match_events)
            .and_then(|rounds| reduce_match(&match_id, &rounds, rules));
        match result {
            Ok(output) => {
                summary.succeeded.push(match_id);
                outputs.push(output);
            }
            Err(err) => {
                log::warn!("match '{match_id}' failed: {err}");
                summary.failed.push((match_id, err));
            }
        }
    }

    (outputs, summary)
}
