//! The economic event model.
//!
//! RULE: Events are immutable once produced. The reducer folds over
//! them — it never mutates an event, and it never trusts their arrival
//! order (ordering.rs re-establishes the total order).

use serde::{Deserialize, Serialize};

use crate::types::{GameTick, MatchId, RoundNumber, SteamId, Team};

/// One atomic economic occurrence within a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub match_id: MatchId,
    pub round_number: RoundNumber,
    pub tick: GameTick,
    /// Globally unique and stable — ordering tie-break and lineage.
    pub event_id: String,
    pub kind: EventKind,
    #[serde(default)]
    pub actor_steamid: SteamId,
    #[serde(default)]
    pub victim_steamid: SteamId,
    /// Side of the actor. Absent for round-level events.
    #[serde(default)]
    pub team: Option<Team>,
    #[serde(default)]
    pub weapon: String,
    /// Purchase price, buy events only.
    #[serde(default)]
    pub price: i64,
    /// Explicit currency delta, money events only. May be negative.
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub payload: Option<EventPayload>,
}

impl Event {
    /// The total-order sort key: `(match_id, round_number, tick, event_id)`.
    pub fn sort_key(&self) -> (&str, RoundNumber, GameTick, &str) {
        (&self.match_id, self.round_number, self.tick, &self.event_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RoundStart,
    RoundEnd,
    Buy,
    Kill,
    Assist,
    Plant,
    Defuse,
    Money,
    DeathAfterTime,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RoundStart => "round_start",
            EventKind::RoundEnd => "round_end",
            EventKind::Buy => "buy",
            EventKind::Kill => "kill",
            EventKind::Assist => "assist",
            EventKind::Plant => "plant",
            EventKind::Defuse => "defuse",
            EventKind::Money => "money",
            EventKind::DeathAfterTime => "death_after_time",
        }
    }

    pub fn parse(s: &str) -> Option<EventKind> {
        match s {
            "round_start" => Some(EventKind::RoundStart),
            "round_end" => Some(EventKind::RoundEnd),
            "buy" => Some(EventKind::Buy),
            "kill" => Some(EventKind::Kill),
            "assist" => Some(EventKind::Assist),
            "plant" => Some(EventKind::Plant),
            "defuse" => Some(EventKind::Defuse),
            "money" => Some(EventKind::Money),
            "death_after_time" => Some(EventKind::DeathAfterTime),
            _ => None,
        }
    }
}

/// Typed round-end metadata. The upstream parser emits these as loose
/// key/value pairs; only the known fields are modeled, and `win_type` /
/// `winner` stay as raw strings until outcome resolution, where an
/// unrecognized value becomes a typed error instead of a silent default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planted_site: Option<String>,
}

/// How a round was won. Each variant maps to a distinct payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinType {
    Elimination,
    TBombExplosion,
    CtDefuse,
    CtTimeExpiredNoPlant,
}

impl WinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WinType::Elimination => "elimination",
            WinType::TBombExplosion => "t_bomb_explosion",
            WinType::CtDefuse => "ct_defuse",
            WinType::CtTimeExpiredNoPlant => "ct_time_expired_no_plant",
        }
    }

    /// Accepts the canonical names plus the short aliases the upstream
    /// parser has been observed to emit.
    pub fn parse(s: &str) -> Option<WinType> {
        match s {
            "elimination" => Some(WinType::Elimination),
            "t_bomb_explosion" | "bomb_explosion" => Some(WinType::TBombExplosion),
            "ct_defuse" | "defuse" => Some(WinType::CtDefuse),
            "ct_time_expired_no_plant" | "time_expired" => Some(WinType::CtTimeExpiredNoPlant),
            _ => None,
        }
    }

    /// The side a win type implies, where unambiguous.
    /// Elimination can go either way and returns None.
    pub fn implied_winner(&self) -> Option<Team> {
        match self {
            WinType::Elimination => None,
            WinType::TBombExplosion => Some(Team::T),
            WinType::CtDefuse => Some(Team::Ct),
            WinType::CtTimeExpiredNoPlant => Some(Team::Ct),
        }
    }
}
