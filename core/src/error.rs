use thiserror::Error;

use crate::types::{MatchId, RoundNumber};

#[derive(Error, Debug)]
pub enum EconError {
    #[error("Data integrity error in match '{match_id}' (round {round_number:?}, event {event_id:?}): {reason}")]
    DataIntegrity {
        match_id: MatchId,
        round_number: Option<RoundNumber>,
        event_id: Option<String>,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invariant violation in match '{match_id}', round {round_number} (event {event_id:?}): {reason}")]
    InvariantViolation {
        match_id: MatchId,
        round_number: RoundNumber,
        event_id: Option<String>,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EconResult<T> = Result<T, EconError>;
