//! Drift detection — recompute a match from raw events and diff the
//! result against previously persisted snapshots.
//!
//! RULE: verification reports, it never repairs. A mismatch is data for
//! the operator, not a trigger for a rewrite.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EconResult;
use crate::event::Event;
use crate::ordering::order_events;
use crate::driver::reduce_match;
use crate::reducer::TeamSnapshot;
use crate::rules::Rules;
use crate::types::{MatchId, RoundNumber, Team};

/// One field-level difference between a persisted snapshot and its
/// recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMismatch {
    pub round_number: RoundNumber,
    pub team: Team,
    pub field: String,
    pub expected: String,
    pub recomputed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub match_id: MatchId,
    pub ok: bool,
    pub mismatches: Vec<FieldMismatch>,
}

/// Recompute `match_id` from `events` and compare every snapshot field
/// by value, the checksum by exact string equality.
pub fn verify_match(
    match_id: &str,
    persisted: &[TeamSnapshot],
    events: Vec<Event>,
    rules: &Rules,
) -> EconResult<VerificationReport> {
    let rounds = order_events(events)?;
    let recomputed = reduce_match(match_id, &rounds, rules)?;

    let mut by_key: BTreeMap<(RoundNumber, Team), &TeamSnapshot> = BTreeMap::new();
    for snapshot in &recomputed.snapshots {
        by_key.insert((snapshot.round_number, snapshot.team), snapshot);
    }

    let mut mismatches = Vec::new();
    for old in persisted {
        let key = (old.round_number, old.team);
        let Some(new) = by_key.remove(&key) else {
            mismatches.push(FieldMismatch {
                round_number: old.round_number,
                team: old.team,
                field: "snapshot".to_string(),
                expected: "present".to_string(),
                recomputed: "missing".to_string(),
            });
            continue;
        };
        diff_snapshots(old, new, &mut mismatches);
    }
    // Anything left over was recomputed but never persisted.
    for ((round_number, team), _) in by_key {
        mismatches.push(FieldMismatch {
            round_number,
            team,
            field: "snapshot".to_string(),
            expected: "missing".to_string(),
            recomputed: "present".to_string(),
        });
    }

    let ok = mismatches.is_empty();
    if ok {
        log::info!("match '{match_id}' verified clean ({} snapshots)", persisted.len());
    } else {
        log::warn!(
            "match '{match_id}' drifted: {} field mismatches",
            mismatches.len()
        );
    }

    Ok(VerificationReport {
        match_id: match_id.to_string(),
        ok,
        mismatches,
    })
}

fn diff_snapshots(old: &TeamSnapshot, new: &TeamSnapshot, out: &mut Vec<FieldMismatch>) {
    let mut push = |field: &str, expected: String, recomputed: String| {
        if expected != recomputed {
            out.push(FieldMismatch {
                round_number: old.round_number,
                team: old.team,
                field: field.to_string(),
                expected,
                recomputed,
            });
        }
    };

    push("bank_total_start", old.bank_total_start.to_string(), new.bank_total_start.to_string());
    push("equip_total_start", old.equip_total_start.to_string(), new.equip_total_start.to_string());
    push("spend_sum", old.spend_sum.to_string(), new.spend_sum.to_string());
    push("kill_reward_sum", old.kill_reward_sum.to_string(), new.kill_reward_sum.to_string());
    push("win_reward", old.win_reward.to_string(), new.win_reward.to_string());
    push("loss_bonus", old.loss_bonus.to_string(), new.loss_bonus.to_string());
    push("plant_bonus_team", old.plant_bonus_team.to_string(), new.plant_bonus_team.to_string());
    push("planter_bonus", old.planter_bonus.to_string(), new.planter_bonus.to_string());
    push("defuse_bonus", old.defuse_bonus.to_string(), new.defuse_bonus.to_string());
    push("money_sum", old.money_sum.to_string(), new.money_sum.to_string());
    push("bank_total_end", old.bank_total_end.to_string(), new.bank_total_end.to_string());
    push("equip_total_end", old.equip_total_end.to_string(), new.equip_total_end.to_string());
    push(
        "inputs_event_ids",
        old.inputs_event_ids.join(","),
        new.inputs_event_ids.join(","),
    );
    push("checksum", old.checksum.clone(), new.checksum.clone());
    push("rules_version", old.rules_version.clone(), new.rules_version.clone());
}
