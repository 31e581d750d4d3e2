//! Accounting identity and money bounds over full matches.

use cs2econ_core::{
    driver::reduce_match,
    event::{Event, EventKind, EventPayload},
    ordering::order_events,
    reducer::{BalanceAt, TeamSnapshot},
    rules::Rules,
    types::Team,
};

fn ev(round: u32, tick: i64, id: &str, kind: EventKind) -> Event {
    Event {
        match_id: "acct".to_string(),
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

fn round_end(round: u32, tick: i64, id: &str, winner: &str, win_type: &str) -> Event {
    let mut e = ev(round, tick, id, EventKind::RoundEnd);
    e.payload = Some(EventPayload {
        winner: Some(winner.to_string()),
        win_type: Some(win_type.to_string()),
        planted_site: None,
    });
    e
}

/// Three rounds mixing buys, kills, a plant/defuse and an explicit
/// money adjustment.
fn fixture() -> Vec<Event> {
    let mut events = Vec::new();

    events.push(ev(1, 0, "r1-00", EventKind::RoundStart));
    for (i, (player, team, price)) in [
        ("t1", Team::T, 650),
        ("t2", Team::T, 200),
        ("ct1", Team::Ct, 500),
        ("ct2", Team::Ct, 650),
    ]
    .iter()
    .enumerate()
    {
        let mut buy = acted(ev(1, 10 + i as i64, &format!("r1-buy{i}"), EventKind::Buy), player, *team);
        buy.price = *price;
        events.push(buy);
    }
    let mut kill = acted(ev(1, 50, "r1-kill", EventKind::Kill), "t1", Team::T);
    kill.weapon = "glock".to_string();
    kill.victim_steamid = "ct2".to_string();
    events.push(kill);
    events.push(round_end(1, 100, "r1-end", "T", "elimination"));

    events.push(ev(2, 0, "r2-00", EventKind::RoundStart));
    let mut buy = acted(ev(2, 10, "r2-buy", EventKind::Buy), "t1", Team::T);
    buy.price = 2700;
    events.push(buy);
    let mut adjust = acted(ev(2, 20, "r2-money", EventKind::Money), "ct1", Team::Ct);
    adjust.amount = 150;
    events.push(adjust);
    let plant = acted(ev(2, 40, "r2-plant", EventKind::Plant), "t2", Team::T);
    events.push(plant);
    let defuse = acted(ev(2, 80, "r2-defuse", EventKind::Defuse), "ct1", Team::Ct);
    events.push(defuse);
    events.push(ev(2, 100, "r2-end", EventKind::RoundEnd));

    events.push(ev(3, 0, "r3-00", EventKind::RoundStart));
    let mut kill = acted(ev(3, 50, "r3-kill", EventKind::Kill), "ct2", Team::Ct);
    kill.weapon = "ak47".to_string();
    kill.victim_steamid = "t2".to_string();
    events.push(kill);
    events.push(round_end(3, 100, "r3-end", "CT", "elimination"));

    events
}

fn identity_delta(s: &TeamSnapshot) -> i64 {
    s.bank_total_start + s.win_reward + s.loss_bonus + s.kill_reward_sum
        + s.planter_bonus
        + s.defuse_bonus
        + s.plant_bonus_team
        + s.money_sum
        - s.spend_sum
        - s.bank_total_end
}

#[test]
fn accounting_identity_holds_for_every_snapshot() {
    let rules = Rules::default();
    let rounds = order_events(fixture()).expect("ordering");
    let output = reduce_match("acct", &rounds, &rules).expect("reduce");

    assert_eq!(output.snapshots.len(), 6, "two teams, three rounds");
    for snapshot in &output.snapshots {
        assert_eq!(
            identity_delta(snapshot),
            0,
            "identity broken for {} round {}",
            snapshot.team,
            snapshot.round_number
        );
    }
}

#[test]
fn bank_stays_within_bounds_on_every_balance_row() {
    let rules = Rules::default();
    let rounds = order_events(fixture()).expect("ordering");
    let output = reduce_match("acct", &rounds, &rules).expect("reduce");

    for row in &output.balances {
        assert!(
            row.bank >= 0 && row.bank <= rules.money_cap,
            "bank {} out of bounds for {} round {} at {:?}",
            row.bank,
            row.player_steamid,
            row.round_number,
            row.at
        );
    }
}

#[test]
fn money_events_flow_through_money_sum() {
    let rules = Rules::default();
    let rounds = order_events(fixture()).expect("ordering");
    let output = reduce_match("acct", &rounds, &rules).expect("reduce");

    let ct_round2 = output
        .snapshots
        .iter()
        .find(|s| s.round_number == 2 && s.team == Team::Ct)
        .expect("CT round 2 snapshot");
    assert_eq!(ct_round2.money_sum, 150);
}

#[test]
fn cap_hit_is_flagged_and_bank_clamped() {
    let rules = Rules::default();

    let mut windfall = acted(ev(1, 10, "e2", EventKind::Money), "t1", Team::T);
    windfall.amount = 20_000;
    let events = vec![
        ev(1, 0, "e1", EventKind::RoundStart),
        windfall,
        round_end(1, 100, "e3", "T", "elimination"),
    ];

    let rounds = order_events(events).expect("ordering");
    let output = reduce_match("acct", &rounds, &rules).expect("reduce");

    let end = output
        .balances
        .iter()
        .find(|b| b.player_steamid == "t1" && b.at == BalanceAt::End)
        .expect("end row");
    assert_eq!(end.bank, rules.money_cap);
    assert_eq!(end.cap_hit, 1);

    let start = output
        .balances
        .iter()
        .find(|b| b.player_steamid == "t1" && b.at == BalanceAt::Start)
        .expect("start row");
    assert_eq!(start.cap_hit, 0);
}

#[test]
fn state_rows_record_streaks_and_flags() {
    let rules = Rules::default();

    let events = vec![
        ev(1, 0, "r1-00", EventKind::RoundStart),
        acted(ev(1, 90, "r1-dat", EventKind::DeathAfterTime), "t1", Team::T),
        round_end(1, 100, "r1-end", "CT", "ct_time_expired_no_plant"),
        ev(2, 0, "r2-00", EventKind::RoundStart),
        round_end(2, 100, "r2-end", "CT", "elimination"),
    ];
    let rounds = order_events(events).expect("ordering");
    let output = reduce_match("acct", &rounds, &rules).expect("reduce");

    let t_streak_r1 = output
        .states
        .iter()
        .find(|s| s.round_number == 1 && s.team == Some(Team::T))
        .expect("T state row");
    assert_eq!(t_streak_r1.loss_streak_after, Some(1));

    let ct_streak_r1 = output
        .states
        .iter()
        .find(|s| s.round_number == 1 && s.team == Some(Team::Ct))
        .expect("CT state row");
    assert_eq!(ct_streak_r1.loss_streak_after, Some(0));

    let t1_r1 = output
        .states
        .iter()
        .find(|s| s.round_number == 1 && s.player_steamid.as_deref() == Some("t1"))
        .expect("t1 state row");
    assert_eq!(t1_r1.zero_income_next_round, Some(true));

    let t1_r2 = output
        .states
        .iter()
        .find(|s| s.round_number == 2 && s.player_steamid.as_deref() == Some("t1"))
        .expect("t1 round 2 state row");
    assert_eq!(
        t1_r2.zero_income_next_round,
        Some(false),
        "flag consumed at the start of round 2"
    );
}

#[test]
fn lineage_lists_every_event_exactly_once_sorted() {
    let rules = Rules::default();
    let rounds = order_events(fixture()).expect("ordering");
    let output = reduce_match("acct", &rounds, &rules).expect("reduce");

    let r1 = output
        .snapshots
        .iter()
        .find(|s| s.round_number == 1 && s.team == Team::T)
        .expect("round 1 snapshot");

    let mut expected: Vec<String> = vec![
        "r1-00", "r1-buy0", "r1-buy1", "r1-buy2", "r1-buy3", "r1-kill", "r1-end",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    expected.sort();
    assert_eq!(r1.inputs_event_ids, expected);

    // Both teams of a round share one lineage and one checksum.
    let r1_ct = output
        .snapshots
        .iter()
        .find(|s| s.round_number == 1 && s.team == Team::Ct)
        .expect("round 1 CT snapshot");
    assert_eq!(r1.checksum, r1_ct.checksum);
}
