//! Ordering-stage validation: canonical sort, duplicate handling,
//! gap detection.

use cs2econ_core::{
    error::EconError,
    event::{Event, EventKind},
    ordering::{order_events, partition_by_match},
};

fn ev(match_id: &str, round: u32, tick: i64, id: &str, kind: EventKind) -> Event {
    Event {
        match_id: match_id.to_string(),
        round_number: round,
        tick,
        event_id: id.to_string(),
        kind,
        actor_steamid: String::new(),
        victim_steamid: String::new(),
        team: None,
        weapon: String::new(),
        price: 0,
        amount: 0,
        payload: None,
    }
}

#[test]
fn events_are_sorted_into_canonical_order() {
    let events = vec![
        ev("m1", 2, 5, "e5", EventKind::RoundEnd),
        ev("m1", 1, 9, "e3", EventKind::RoundEnd),
        ev("m1", 1, 1, "e1", EventKind::RoundStart),
        ev("m1", 2, 1, "e4", EventKind::RoundStart),
        ev("m1", 1, 1, "e2", EventKind::Buy),
    ];

    let rounds = order_events(events).expect("ordering");
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds[0].round_number, 1);
    assert_eq!(
        rounds[0].events.iter().map(|e| e.event_id.as_str()).collect::<Vec<_>>(),
        vec!["e1", "e2", "e3"],
        "tick then event_id tie-break"
    );
    assert_eq!(rounds[1].round_number, 2);
}

#[test]
fn identical_duplicates_are_dropped() {
    let events = vec![
        ev("m1", 1, 1, "e1", EventKind::RoundStart),
        ev("m1", 1, 1, "e1", EventKind::RoundStart),
        ev("m1", 1, 9, "e2", EventKind::RoundEnd),
    ];

    let rounds = order_events(events).expect("ordering");
    assert_eq!(rounds[0].events.len(), 2, "re-delivery collapses to one event");
}

#[test]
fn conflicting_duplicates_are_fatal() {
    let mut conflicting = ev("m1", 1, 1, "e1", EventKind::Buy);
    conflicting.price = 650;
    let mut other = ev("m1", 1, 1, "e1", EventKind::Buy);
    other.price = 1000;

    let err = order_events(vec![conflicting, other]).unwrap_err();
    match err {
        EconError::DataIntegrity { event_id, .. } => {
            assert_eq!(event_id.as_deref(), Some("e1"));
        }
        other => panic!("expected DataIntegrity, got {other:?}"),
    }
}

#[test]
fn missing_round_is_fatal() {
    let events = vec![
        ev("m1", 1, 1, "e1", EventKind::RoundStart),
        ev("m1", 1, 9, "e2", EventKind::RoundEnd),
        ev("m1", 3, 1, "e3", EventKind::RoundStart),
        ev("m1", 3, 9, "e4", EventKind::RoundEnd),
    ];

    let err = order_events(events).unwrap_err();
    match err {
        EconError::DataIntegrity { round_number, reason, .. } => {
            assert_eq!(round_number, Some(3));
            assert!(reason.contains("missing round"), "reason: {reason}");
        }
        other => panic!("expected DataIntegrity, got {other:?}"),
    }
}

#[test]
fn history_must_start_at_round_one() {
    let events = vec![
        ev("m1", 2, 1, "e1", EventKind::RoundStart),
        ev("m1", 2, 9, "e2", EventKind::RoundEnd),
    ];

    let err = order_events(events).unwrap_err();
    assert!(matches!(err, EconError::DataIntegrity { .. }), "got {err:?}");
}

#[test]
fn multi_match_collection_is_rejected() {
    let events = vec![
        ev("m1", 1, 1, "e1", EventKind::RoundStart),
        ev("m2", 1, 1, "e2", EventKind::RoundStart),
    ];

    let err = order_events(events).unwrap_err();
    assert!(matches!(err, EconError::DataIntegrity { .. }), "got {err:?}");
}

#[test]
fn partition_splits_and_orders_matches() {
    let events = vec![
        ev("m2", 1, 1, "e3", EventKind::RoundStart),
        ev("m1", 1, 1, "e1", EventKind::RoundStart),
        ev("m1", 1, 2, "e2", EventKind::RoundEnd),
    ];

    let by_match = partition_by_match(events);
    let ids: Vec<_> = by_match.keys().cloned().collect();
    assert_eq!(ids, vec!["m1".to_string(), "m2".to_string()]);
    assert_eq!(by_match["m1"].len(), 2);
    assert_eq!(by_match["m2"].len(), 1);
}

#[test]
fn empty_input_yields_no_rounds() {
    let rounds = order_events(Vec::new()).expect("ordering");
    assert!(rounds.is_empty());
}
