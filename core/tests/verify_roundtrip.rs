//! End-to-end: ingest events into a store, recompute, persist, verify.

use cs2econ_core::{
    driver::reduce_all,
    event::{Event, EventKind, EventPayload},
    rules::Rules,
    store::EconStore,
    types::Team,
    verify::verify_match,
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

fn acted(mut e: Event, steamid: &str, team: Team) -> Event {
    e.actor_steamid = steamid.to_string();
    e.team = Some(team);
    e
}

fn round_end(match_id: &str, round: u32, tick: i64, id: &str, winner: &str) -> Event {
    let mut e = ev(match_id, round, tick, id, EventKind::RoundEnd);
    e.payload = Some(EventPayload {
        winner: Some(winner.to_string()),
        win_type: Some("elimination".to_string()),
        planted_site: None,
    });
    e
}

fn match_events(match_id: &str) -> Vec<Event> {
    let mut buy = acted(ev(match_id, 1, 10, &format!("{match_id}-b1"), EventKind::Buy), "t1", Team::T);
    buy.price = 650;
    let mut kill = acted(ev(match_id, 1, 50, &format!("{match_id}-k1"), EventKind::Kill), "t1", Team::T);
    kill.weapon = "ak47".to_string();
    kill.victim_steamid = "ct1".to_string();
    let mut ct_buy = acted(ev(match_id, 2, 10, &format!("{match_id}-b2"), EventKind::Buy), "ct1", Team::Ct);
    ct_buy.price = 500;

    vec![
        ev(match_id, 1, 0, &format!("{match_id}-s1"), EventKind::RoundStart),
        buy,
        kill,
        round_end(match_id, 1, 100, &format!("{match_id}-e1"), "T"),
        ev(match_id, 2, 0, &format!("{match_id}-s2"), EventKind::RoundStart),
        ct_buy,
        round_end(match_id, 2, 100, &format!("{match_id}-e2"), "CT"),
    ]
}

fn seeded_store() -> EconStore {
    let store = EconStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
        .insert_events(&match_events("m1"), "fixture")
        .expect("insert m1");
    store
        .insert_events(&match_events("m2"), "fixture")
        .expect("insert m2");
    store
}

fn recompute_and_persist(store: &EconStore) {
    let rules = Rules::default();
    let events = store.scan_events(None).expect("scan");
    let (outputs, summary) = reduce_all(events, &rules);
    assert!(summary.all_ok(), "failures: {:?}", summary.failed);
    for output in &outputs {
        store.write_match_output(output).expect("write output");
    }
}

#[test]
fn recompute_then_verify_is_clean() {
    let store = seeded_store();
    recompute_and_persist(&store);

    let rules = Rules::default();
    for match_id in store.list_match_ids().expect("match ids") {
        let persisted = store.read_snapshots(&match_id).expect("snapshots");
        assert!(!persisted.is_empty());
        let events = store.scan_events(Some(&match_id)).expect("scan");
        let report = verify_match(&match_id, &persisted, events, &rules).expect("verify");
        assert!(report.ok, "mismatches: {:?}", report.mismatches);
    }
}

#[test]
fn verify_is_idempotent() {
    let store = seeded_store();
    recompute_and_persist(&store);

    let rules = Rules::default();
    let persisted = store.read_snapshots("m1").expect("snapshots");

    let first = verify_match(
        "m1",
        &persisted,
        store.scan_events(Some("m1")).expect("scan"),
        &rules,
    )
    .expect("first verify");
    let second = verify_match(
        "m1",
        &persisted,
        store.scan_events(Some("m1")).expect("scan"),
        &rules,
    )
    .expect("second verify");

    assert_eq!(first.ok, second.ok);
    assert_eq!(first.mismatches, second.mismatches);
}

#[test]
fn tampered_snapshot_is_reported_not_repaired() {
    let store = seeded_store();
    recompute_and_persist(&store);

    let rules = Rules::default();
    let mut persisted = store.read_snapshots("m1").expect("snapshots");
    persisted[0].kill_reward_sum += 999;

    let report = verify_match(
        "m1",
        &persisted,
        store.scan_events(Some("m1")).expect("scan"),
        &rules,
    )
    .expect("verify");

    assert!(!report.ok);
    assert_eq!(report.mismatches.len(), 1);
    let m = &report.mismatches[0];
    assert_eq!(m.field, "kill_reward_sum");
    assert_eq!(m.round_number, persisted[0].round_number);

    // The persisted rows in the store are untouched.
    let reread = store.read_snapshots("m1").expect("reread");
    assert_ne!(reread[0].kill_reward_sum, persisted[0].kill_reward_sum);
}

#[test]
fn tampered_checksum_is_caught_by_exact_comparison() {
    let store = seeded_store();
    recompute_and_persist(&store);

    let rules = Rules::default();
    let mut persisted = store.read_snapshots("m1").expect("snapshots");
    persisted[0].checksum = "deadbeef".to_string();

    let report = verify_match(
        "m1",
        &persisted,
        store.scan_events(Some("m1")).expect("scan"),
        &rules,
    )
    .expect("verify");

    assert!(report.mismatches.iter().any(|m| m.field == "checksum"));
}

#[test]
fn events_round_trip_through_the_store() {
    let store = EconStore::in_memory().expect("store");
    store.migrate().expect("migration");

    let mut original = match_events("m1");
    // Give one event a payload with every field populated.
    original[3].payload = Some(EventPayload {
        winner: Some("T".to_string()),
        win_type: Some("elimination".to_string()),
        planted_site: Some("B".to_string()),
    });
    store.insert_events(&original, "roundtrip").expect("insert");

    let mut scanned = store.scan_events(Some("m1")).expect("scan");
    scanned.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    original.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    assert_eq!(scanned, original);
}

#[test]
fn one_bad_match_does_not_block_the_batch() {
    let store = EconStore::in_memory().expect("store");
    store.migrate().expect("migration");
    store
        .insert_events(&match_events("good"), "fixture")
        .expect("insert good");
    // A match whose history starts at round 2: fails ordering.
    let bad = vec![
        ev("bad", 2, 0, "bad-s2", EventKind::RoundStart),
        round_end("bad", 2, 100, "bad-e2", "T"),
    ];
    store.insert_events(&bad, "fixture").expect("insert bad");

    let rules = Rules::default();
    let events = store.scan_events(None).expect("scan");
    let (outputs, summary) = reduce_all(events, &rules);

    assert_eq!(outputs.len(), 1);
    assert_eq!(summary.succeeded, vec!["good".to_string()]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "bad");
}
