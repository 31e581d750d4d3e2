//! Event ordering and input validation.
//!
//! This is the sole trust boundary for upstream data: the event source
//! promises a schema but not an order, so the canonical total order
//! `(match_id, round_number, tick, event_id)` is re-established here on
//! every run. No business logic lives in this module.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::error::{EconError, EconResult};
use crate::event::Event;
use crate::types::{MatchId, RoundNumber};

/// One round's events, in canonical order.
#[derive(Debug, Clone)]
pub struct RoundGroup {
    pub round_number: RoundNumber,
    pub events: Vec<Event>,
}

/// Split a multi-match stream into per-match collections, keyed in
/// deterministic (sorted) match order.
pub fn partition_by_match(events: Vec<Event>) -> BTreeMap<MatchId, Vec<Event>> {
    let mut by_match: BTreeMap<MatchId, Vec<Event>> = BTreeMap::new();
    for event in events {
        by_match.entry(event.match_id.clone()).or_default().push(event);
    }
    by_match
}

/// Sort one match's events into the canonical order, drop byte-identical
/// duplicates, and group by round.
///
/// Fails with a data-integrity error when:
/// - two events share an `event_id` but differ in any field,
/// - the sorted round numbers are non-contiguous (missing-round gap),
/// - the first round is not round 1,
/// - the collection spans more than one `match_id`.
pub fn order_events(mut events: Vec<Event>) -> EconResult<Vec<RoundGroup>> {
    if events.is_empty() {
        return Ok(Vec::new());
    }

    events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let match_id = events[0].match_id.clone();
    if let Some(stray) = events.iter().find(|e| e.match_id != match_id) {
        return Err(EconError::DataIntegrity {
            match_id: match_id.clone(),
            round_number: None,
            event_id: Some(stray.event_id.clone()),
            reason: format!(
                "collection spans multiple matches ('{}' and '{}')",
                match_id, stray.match_id
            ),
        });
    }

    // Duplicate-ID pass. Identical re-deliveries are dropped; the same
    // id with differing fields is an upstream conflict and fatal.
    let keep = {
        let mut seen: HashMap<&str, &Event> = HashMap::new();
        let mut keep = vec![true; events.len()];
        for (i, event) in events.iter().enumerate() {
            match seen.get(event.event_id.as_str()) {
                None => {
                    seen.insert(&event.event_id, event);
                }
                Some(first) if *first == event => {
                    log::debug!(
                        "dropping identical duplicate event '{}' in match '{}'",
                        event.event_id, match_id
                    );
                    keep[i] = false;
                }
                Some(_) => {
                    return Err(EconError::DataIntegrity {
                        match_id,
                        round_number: Some(event.round_number),
                        event_id: Some(event.event_id.clone()),
                        reason: "duplicate event_id with conflicting field values".to_string(),
                    });
                }
            }
        }
        keep
    };
    let mut keep_flags = keep.into_iter();
    events.retain(|_| keep_flags.next().unwrap_or(false));

    // Group contiguous runs of the same round number.
    let mut groups: Vec<RoundGroup> = Vec::new();
    for event in events {
        match groups.last_mut() {
            Some(group) if group.round_number == event.round_number => {
                group.events.push(event);
            }
            _ => groups.push(RoundGroup {
                round_number: event.round_number,
                events: vec![event],
            }),
        }
    }

    // Contiguity: rounds must run 1, 2, 3, ... with no gap. A partial
    // economic history cannot be reduced correctly, so a gap is fatal
    // for the whole match.
    let mut expected: RoundNumber = 1;
    for group in &groups {
        if group.round_number != expected {
            return Err(EconError::DataIntegrity {
                match_id: group.events[0].match_id.clone(),
                round_number: Some(group.round_number),
                event_id: None,
                reason: format!(
                    "missing round: expected round {expected}, found round {}",
                    group.round_number
                ),
            });
        }
        expected += 1;
    }

    Ok(groups)
}
