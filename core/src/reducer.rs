//! The round reducer — the heart of the economy pipeline.
//!
//! PROCESSING ORDER (fixed, documented, never reordered):
//!   1. Consume pending zero-income flags, reset equipment, emit
//!      `at=start` balances.
//!   2. Fold the round's events in canonical order (buys, kills,
//!      assists, plant, defuse, money adjustments).
//!   3. Resolve the round outcome and pay win reward / loss bonus /
//!      objective bonuses; advance loss streaks; arm zero-income flags.
//!   4. Check the accounting identity, clamp banks, emit `at=end`
//!      balances and per-team snapshots with lineage checksums.
//!
//! RULES:
//!   - The reducer is a pure fold: prior state in, next state out.
//!   - Any malformed event aborts the whole round. There is no partial
//!     output for a round, ever.
//!   - Events arrive already ordered and deduplicated (ordering.rs).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EconError, EconResult};
use crate::event::{Event, EventKind, EventPayload, WinType};
use crate::ordering::RoundGroup;
use crate::rules::Rules;
use crate::state::{PlayerEconomicState, TeamEconomicState};
use crate::types::{MatchId, RoundNumber, SteamId, Team};

/// Balance checkpoint within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceAt {
    Start,
    End,
}

impl BalanceAt {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceAt::Start => "start",
            BalanceAt::End => "end",
        }
    }

    pub fn parse(s: &str) -> Option<BalanceAt> {
        match s {
            "start" => Some(BalanceAt::Start),
            "end" => Some(BalanceAt::End),
            _ => None,
        }
    }
}

/// One player's balance at one checkpoint. The player-level audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub match_id: MatchId,
    pub round_number: RoundNumber,
    pub player_steamid: SteamId,
    pub team: Team,
    pub at: BalanceAt,
    pub bank: i64,
    pub equipment_value: i64,
    pub loss_streak: u32,
    /// 1 when clamping changed the bank this round, else 0.
    pub cap_hit: i64,
    pub rules_version: String,
}

/// Aggregated team economics for one round, with full lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub match_id: MatchId,
    pub round_number: RoundNumber,
    pub team: Team,
    pub bank_total_start: i64,
    pub equip_total_start: i64,
    pub spend_sum: i64,
    pub kill_reward_sum: i64,
    pub win_reward: i64,
    pub loss_bonus: i64,
    pub plant_bonus_team: i64,
    pub planter_bonus: i64,
    pub defuse_bonus: i64,
    /// Net of explicit money-adjustment events. Without this term the
    /// accounting identity cannot hold on inputs that contain them.
    pub money_sum: i64,
    pub bank_total_end: i64,
    pub equip_total_end: i64,
    /// Sorted distinct ids of every event folded into this round.
    pub inputs_event_ids: Vec<String>,
    /// `sha256(concat(sorted ids) + rules_version)`, lowercase hex.
    pub checksum: String,
    pub rules_version: String,
}

/// Everything one `reduce_round` call produces.
#[derive(Debug, Clone)]
pub struct RoundResult {
    pub balances: Vec<BalanceRecord>,
    pub snapshots: Vec<TeamSnapshot>,
    pub team_states: BTreeMap<Team, TeamEconomicState>,
    pub player_states: BTreeMap<SteamId, PlayerEconomicState>,
    pub lineage: Vec<String>,
}

/// Per-team running sums for the round.
#[derive(Debug, Clone, Copy, Default)]
struct TeamTally {
    spend_sum: i64,
    kill_reward_sum: i64,
    win_reward: i64,
    loss_bonus: i64,
    plant_bonus_team: i64,
    planter_bonus: i64,
    defuse_bonus: i64,
    money_sum: i64,
}

/// What the event fold observed about the round, consulted at round end.
#[derive(Debug, Default)]
struct RoundFacts {
    planted: bool,
    planter: Option<SteamId>,
    planted_site: Option<String>,
    defused: bool,
    saw_round_end: bool,
    end_payload: Option<EventPayload>,
    deaths_after_time: Vec<SteamId>,
}

/// Reduce one round's ordered events against the previous cross-round
/// state. Pure: inputs are untouched, all effects are in the result.
pub fn reduce_round(
    prev_team_states: &BTreeMap<Team, TeamEconomicState>,
    prev_player_states: &BTreeMap<SteamId, PlayerEconomicState>,
    round: &RoundGroup,
    rules: &Rules,
) -> EconResult<RoundResult> {
    let first = round.events.first().ok_or_else(|| EconError::DataIntegrity {
        match_id: String::new(),
        round_number: Some(round.round_number),
        event_id: None,
        reason: "empty round group".to_string(),
    })?;
    let match_id = first.match_id.clone();
    let round_number = round.round_number;

    let mut team_states = prev_team_states.clone();
    let mut player_states = prev_player_states.clone();
    for team in [Team::T, Team::Ct] {
        team_states
            .entry(team)
            .or_insert_with(|| TeamEconomicState::initial(team));
    }

    // First-seen players join at start money.
    for event in &round.events {
        if event.actor_steamid.is_empty() || player_states.contains_key(&event.actor_steamid) {
            continue;
        }
        let team = event.team.ok_or_else(|| EconError::DataIntegrity {
            match_id: match_id.clone(),
            round_number: Some(round_number),
            event_id: Some(event.event_id.clone()),
            reason: format!(
                "first appearance of player '{}' without a team",
                event.actor_steamid
            ),
        })?;
        player_states.insert(
            event.actor_steamid.clone(),
            PlayerEconomicState::initial(event.actor_steamid.clone(), team, rules),
        );
    }

    // Consume pending zero-income flags into this round's working set
    // and reset equipment for the new round.
    let mut zero_income: BTreeSet<SteamId> = BTreeSet::new();
    for (steamid, player) in player_states.iter_mut() {
        if player.zero_income_next_round {
            zero_income.insert(steamid.clone());
            player.zero_income_next_round = false;
        }
        player.equipment_value = 0;
    }

    // ── Start-of-round balances ─────────────────────────────────────
    let mut balances: Vec<BalanceRecord> = Vec::with_capacity(player_states.len() * 2);
    for player in player_states.values() {
        let loss_streak = team_states
            .get(&player.team)
            .map(|t| t.loss_streak)
            .unwrap_or(0);
        balances.push(BalanceRecord {
            match_id: match_id.clone(),
            round_number,
            player_steamid: player.steamid.clone(),
            team: player.team,
            at: BalanceAt::Start,
            bank: player.bank,
            equipment_value: player.equipment_value,
            loss_streak,
            cap_hit: 0,
            rules_version: rules.version.clone(),
        });
    }

    // ── Event fold ──────────────────────────────────────────────────
    let mut tallies: BTreeMap<Team, TeamTally> = BTreeMap::new();
    let mut facts = RoundFacts::default();

    for event in &round.events {
        match event.kind {
            EventKind::RoundStart => {}
            EventKind::RoundEnd => {
                facts.saw_round_end = true;
                facts.end_payload = event.payload.clone();
            }
            EventKind::Buy => {
                let player = actor_mut(&mut player_states, event, &match_id, round_number)?;
                if event.price <= 0 {
                    return Err(EconError::DataIntegrity {
                        match_id,
                        round_number: Some(round_number),
                        event_id: Some(event.event_id.clone()),
                        reason: format!("buy with non-positive price {}", event.price),
                    });
                }
                if player.bank < event.price {
                    return Err(EconError::InvariantViolation {
                        match_id,
                        round_number,
                        event_id: Some(event.event_id.clone()),
                        reason: format!(
                            "buy of {} would drive bank {} negative for player '{}'",
                            event.price, player.bank, player.steamid
                        ),
                    });
                }
                player.bank -= event.price;
                player.equipment_value += event.price;
                tallies.entry(player.team).or_default().spend_sum += event.price;
            }
            EventKind::Kill => {
                let reward = rules.kill_reward_for(&event.weapon)?;
                let player = actor_mut(&mut player_states, event, &match_id, round_number)?;
                player.bank += reward;
                tallies.entry(player.team).or_default().kill_reward_sum += reward;
            }
            EventKind::Assist => {
                // assist_reward is 0 under the current ruleset: the event
                // still enters the lineage and the tally, explicitly.
                let reward = rules.assist_reward;
                let player = actor_mut(&mut player_states, event, &match_id, round_number)?;
                player.bank += reward;
                tallies.entry(player.team).or_default().kill_reward_sum += reward;
            }
            EventKind::Plant => {
                let player = actor_mut(&mut player_states, event, &match_id, round_number)?;
                facts.planted = true;
                facts.planter = Some(player.steamid.clone());
                facts.planted_site = event
                    .payload
                    .as_ref()
                    .and_then(|p| p.planted_site.clone());
                // No immediate payout: plant bonuses resolve at round end.
            }
            EventKind::Defuse => {
                let bonus = rules.actor_objective_bonus;
                let player = actor_mut(&mut player_states, event, &match_id, round_number)?;
                facts.defused = true;
                player.bank += bonus;
                tallies.entry(player.team).or_default().defuse_bonus += bonus;
            }
            EventKind::Money => {
                let player = actor_mut(&mut player_states, event, &match_id, round_number)?;
                if player.bank + event.amount < 0 {
                    return Err(EconError::InvariantViolation {
                        match_id,
                        round_number,
                        event_id: Some(event.event_id.clone()),
                        reason: format!(
                            "money adjustment of {} would drive bank {} negative for player '{}'",
                            event.amount, player.bank, player.steamid
                        ),
                    });
                }
                player.bank += event.amount;
                tallies.entry(player.team).or_default().money_sum += event.amount;
            }
            EventKind::DeathAfterTime => {
                let player = actor_mut(&mut player_states, event, &match_id, round_number)?;
                // Only a T-side death with the bomb still unplanted
                // triggers the zero-income carry.
                if !facts.planted && player.team == Team::T {
                    facts.deaths_after_time.push(player.steamid.clone());
                }
            }
        }
    }

    if !facts.saw_round_end {
        return Err(EconError::DataIntegrity {
            match_id,
            round_number: Some(round_number),
            event_id: None,
            reason: "round has no round_end event".to_string(),
        });
    }

    // ── Round-end resolution ────────────────────────────────────────
    let (winner, win_type) = infer_outcome(
        &match_id,
        round_number,
        facts.end_payload.as_ref(),
        facts.planted,
        facts.defused,
    )?;
    if let Some(site) = &facts.planted_site {
        log::debug!(
            "match '{match_id}' round {round_number}: bomb planted at site {site}"
        );
    }

    let win_each = rules.win_reward_for(win_type);
    for player in player_states.values_mut().filter(|p| p.team == winner) {
        player.bank += win_each;
        tallies.entry(winner).or_default().win_reward += win_each;
    }

    let loser = winner.opponent();
    let prev_streak = team_states
        .get(&loser)
        .map(|t| t.loss_streak)
        .unwrap_or(0);
    let bonus_each = rules.loss_bonus_for(prev_streak);
    for (steamid, player) in player_states.iter_mut() {
        if player.team != loser {
            continue;
        }
        if zero_income.contains(steamid) {
            log::debug!(
                "player '{steamid}' skips loss bonus in round {round_number} (zero-income carry)"
            );
            continue;
        }
        player.bank += bonus_each;
        tallies.entry(loser).or_default().loss_bonus += bonus_each;
    }

    if let Some(state) = team_states.get_mut(&loser) {
        state.loss_streak += 1;
    }
    if let Some(state) = team_states.get_mut(&winner) {
        state.loss_streak = 0;
    }

    // Planter's personal objective bonus.
    if let Some(planter_id) = &facts.planter {
        if let Some(player) = player_states.get_mut(planter_id) {
            player.bank += rules.actor_objective_bonus;
            tallies.entry(player.team).or_default().planter_bonus +=
                rules.actor_objective_bonus;
        }
    }

    // Plant consolation for a T side that planted but lost.
    if t_plant_consolation_applies(facts.planted, winner, win_type) {
        let bonus = rules.t_plant_team_bonus_on_loss;
        for player in player_states.values_mut().filter(|p| p.team == Team::T) {
            player.bank += bonus;
            tallies.entry(Team::T).or_default().plant_bonus_team += bonus;
        }
    }

    // Arm zero-income flags for the next round.
    for steamid in &facts.deaths_after_time {
        if let Some(player) = player_states.get_mut(steamid) {
            player.zero_income_next_round = true;
        }
    }

    // ── Accounting identity (pre-clamp) ─────────────────────────────
    let mut start_totals: BTreeMap<Team, i64> = BTreeMap::new();
    for row in balances.iter().filter(|b| b.at == BalanceAt::Start) {
        *start_totals.entry(row.team).or_default() += row.bank;
    }
    let mut preclamp_totals: BTreeMap<Team, i64> = BTreeMap::new();
    for player in player_states.values() {
        *preclamp_totals.entry(player.team).or_default() += player.bank;
    }
    for (team, _) in team_states.iter() {
        let tally = tallies.get(team).copied().unwrap_or_default();
        let expected = start_totals.get(team).copied().unwrap_or(0)
            + tally.win_reward
            + tally.loss_bonus
            + tally.kill_reward_sum
            + tally.planter_bonus
            + tally.defuse_bonus
            + tally.plant_bonus_team
            + tally.money_sum
            - tally.spend_sum;
        let actual = preclamp_totals.get(team).copied().unwrap_or(0);
        if expected != actual {
            return Err(EconError::InvariantViolation {
                match_id,
                round_number,
                event_id: None,
                reason: format!(
                    "accounting identity mismatch for team {team}: expected {expected}, got {actual}"
                ),
            });
        }
    }

    // ── Clamp and emit ──────────────────────────────────────────────
    let mut cap_hits: BTreeMap<SteamId, i64> = BTreeMap::new();
    for (steamid, player) in player_states.iter_mut() {
        let clamped = rules.clamp_money(player.bank);
        if clamped != player.bank {
            log::debug!(
                "player '{steamid}' clamped from {} to {clamped} in round {round_number}",
                player.bank
            );
            cap_hits.insert(steamid.clone(), 1);
            player.bank = clamped;
        }
    }

    for player in player_states.values() {
        let loss_streak = team_states
            .get(&player.team)
            .map(|t| t.loss_streak)
            .unwrap_or(0);
        balances.push(BalanceRecord {
            match_id: match_id.clone(),
            round_number,
            player_steamid: player.steamid.clone(),
            team: player.team,
            at: BalanceAt::End,
            bank: player.bank,
            equipment_value: player.equipment_value,
            loss_streak,
            cap_hit: cap_hits.get(&player.steamid).copied().unwrap_or(0),
            rules_version: rules.version.clone(),
        });
    }

    let lineage: Vec<String> = round
        .events
        .iter()
        .map(|e| e.event_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let checksum = lineage_checksum(&lineage, &rules.version);

    let mut snapshots = Vec::with_capacity(team_states.len());
    for team in team_states.keys().copied() {
        let tally = tallies.get(&team).copied().unwrap_or_default();
        let sum = |at: BalanceAt, f: fn(&BalanceRecord) -> i64| -> i64 {
            balances
                .iter()
                .filter(|b| b.team == team && b.at == at)
                .map(f)
                .sum()
        };
        snapshots.push(TeamSnapshot {
            match_id: match_id.clone(),
            round_number,
            team,
            bank_total_start: sum(BalanceAt::Start, |b| b.bank),
            equip_total_start: sum(BalanceAt::Start, |b| b.equipment_value),
            spend_sum: tally.spend_sum,
            kill_reward_sum: tally.kill_reward_sum,
            win_reward: tally.win_reward,
            loss_bonus: tally.loss_bonus,
            plant_bonus_team: tally.plant_bonus_team,
            planter_bonus: tally.planter_bonus,
            defuse_bonus: tally.defuse_bonus,
            money_sum: tally.money_sum,
            bank_total_end: sum(BalanceAt::End, |b| b.bank),
            equip_total_end: sum(BalanceAt::End, |b| b.equipment_value),
            inputs_event_ids: lineage.clone(),
            checksum: checksum.clone(),
            rules_version: rules.version.clone(),
        });
    }

    Ok(RoundResult {
        balances,
        snapshots,
        team_states,
        player_states,
        lineage,
    })
}

/// Whether the T side earns the plant consolation bonus this round.
///
/// The authoritative gating is still unconfirmed against the reference
/// ruleset; it lives in this one predicate so a correction never
/// touches the reducer. Current reading: T planted, T did not win, and
/// the round did not end in a CT defuse.
fn t_plant_consolation_applies(planted: bool, winner: Team, win_type: WinType) -> bool {
    planted && winner != Team::T && win_type != WinType::CtDefuse
}

/// Resolve `(winner, win_type)` for a round.
///
/// Deterministic priority order:
///   1. explicit `win_type` in the round_end payload (winner from the
///      payload, or implied by the win type when unambiguous),
///   2. a defuse event observed this round → CT by defuse,
///   3. a plant event observed this round → T by bomb explosion,
///   4. explicit `winner` in the payload alone → elimination,
///   5. otherwise the outcome is undecidable and the round fails.
fn infer_outcome(
    match_id: &str,
    round_number: RoundNumber,
    payload: Option<&EventPayload>,
    planted: bool,
    defused: bool,
) -> EconResult<(Team, WinType)> {
    let integrity = |reason: String| EconError::DataIntegrity {
        match_id: match_id.to_string(),
        round_number: Some(round_number),
        event_id: None,
        reason,
    };

    if let Some(p) = payload {
        if let Some(raw) = &p.win_type {
            let win_type = WinType::parse(raw)
                .ok_or_else(|| integrity(format!("unrecognized win_type '{raw}'")))?;
            let winner = match &p.winner {
                Some(w) => Team::parse(w)
                    .ok_or_else(|| integrity(format!("unrecognized winner '{w}'")))?,
                None => win_type.implied_winner().ok_or_else(|| {
                    integrity("elimination win without explicit winner".to_string())
                })?,
            };
            return Ok((winner, win_type));
        }
    }

    if defused {
        return Ok((Team::Ct, WinType::CtDefuse));
    }
    if planted {
        return Ok((Team::T, WinType::TBombExplosion));
    }

    if let Some(p) = payload {
        if let Some(w) = &p.winner {
            let winner = Team::parse(w)
                .ok_or_else(|| integrity(format!("unrecognized winner '{w}'")))?;
            return Ok((winner, WinType::Elimination));
        }
    }

    Err(integrity(
        "round outcome undecidable: no win_type, no winner, no plant or defuse observed"
            .to_string(),
    ))
}

fn actor_mut<'a>(
    players: &'a mut BTreeMap<SteamId, PlayerEconomicState>,
    event: &Event,
    match_id: &str,
    round_number: RoundNumber,
) -> EconResult<&'a mut PlayerEconomicState> {
    if event.actor_steamid.is_empty() {
        return Err(EconError::DataIntegrity {
            match_id: match_id.to_string(),
            round_number: Some(round_number),
            event_id: Some(event.event_id.clone()),
            reason: format!("{} event without an actor", event.kind.as_str()),
        });
    }
    players
        .get_mut(&event.actor_steamid)
        .ok_or_else(|| EconError::DataIntegrity {
            match_id: match_id.to_string(),
            round_number: Some(round_number),
            event_id: Some(event.event_id.clone()),
            reason: format!("unknown actor '{}'", event.actor_steamid),
        })
}

fn lineage_checksum(sorted_ids: &[String], rules_version: &str) -> String {
    let mut hasher = Sha256::new();
    for id in sorted_ids {
        hasher.update(id.as_bytes());
    }
    hasher.update(rules_version.as_bytes());
    format!("{:x}", hasher.finalize())
}
