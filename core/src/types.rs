//! Shared primitive types used across the entire pipeline.

use serde::{Deserialize, Serialize};

/// A stable, unique identifier for one match.
pub type MatchId = String;

/// A player's Steam identifier, as delivered by the upstream parser.
pub type SteamId = String;

/// 1-based round number within a match.
pub type RoundNumber = u32;

/// In-game tick, monotonic within a round.
pub type GameTick = i64;

/// The two sides of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    T,
    #[serde(rename = "CT")]
    Ct,
}

impl Team {
    pub fn as_str(&self) -> &'static str {
        match self {
            Team::T => "T",
            Team::Ct => "CT",
        }
    }

    pub fn parse(s: &str) -> Option<Team> {
        match s {
            "T" | "t" => Some(Team::T),
            "CT" | "ct" => Some(Team::Ct),
            _ => None,
        }
    }

    pub fn opponent(&self) -> Team {
        match self {
            Team::T => Team::Ct,
            Team::Ct => Team::T,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
