//! econ-cli: command-line driver for the CS2 economy pipeline.
//!
//! Usage:
//!   econ-cli import    --db econ.db --events events.jsonl [--source demo-parser]
//!   econ-cli recompute --db econ.db [--match m1] [--clear]
//!   econ-cli export    --db econ.db --match m1 [--round 3] [--format table|json]
//!   econ-cli verify    --db econ.db [--match m1]

use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use cs2econ_core::{
    driver::reduce_all,
    event::Event,
    rules::Rules,
    store::EconStore,
    verify::verify_match,
};

fn main() -> Result<ExitCode> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = match args.get(1) {
        Some(c) => c.as_str(),
        None => {
            print_usage();
            bail!("missing command");
        }
    };

    match command {
        "import" => cmd_import(&args),
        "recompute" => cmd_recompute(&args),
        "export" => cmd_export(&args),
        "verify" => cmd_verify(&args),
        other => {
            print_usage();
            bail!("unknown command '{other}'");
        }
    }
}

fn open_store(args: &[String]) -> Result<EconStore> {
    let db = required_arg(args, "--db")?;
    let store = EconStore::open(&db).with_context(|| format!("opening store at {db}"))?;
    store.migrate().context("applying migrations")?;
    Ok(store)
}

// ── import ─────────────────────────────────────────────────────────

fn cmd_import(args: &[String]) -> Result<ExitCode> {
    let store = open_store(args)?;
    let path = required_arg(args, "--events")?;
    let source = optional_arg(args, "--source").unwrap_or_else(|| path.clone());

    let file = File::open(&path).with_context(|| format!("opening {path}"))?;
    let mut events: Vec<Event> = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line)
            .with_context(|| format!("{path}:{}: malformed event", lineno + 1))?;
        events.push(event);
    }
    log::debug!("parsed {} events from {path}", events.len());

    let count = store.insert_events(&events, &source)?;
    println!("imported {count} events from {path}");
    Ok(ExitCode::SUCCESS)
}

// ── recompute ──────────────────────────────────────────────────────

fn cmd_recompute(args: &[String]) -> Result<ExitCode> {
    let store = open_store(args)?;
    let match_filter = optional_arg(args, "--match");
    let clear = has_flag(args, "--clear");

    if clear {
        store.clear_outputs()?;
    }

    let events = store.scan_events(match_filter.as_deref())?;
    if events.is_empty() {
        println!("no events found to process");
        return Ok(ExitCode::FAILURE);
    }
    println!("loaded {} events", events.len());

    let rules = Rules::default();
    let (outputs, summary) = reduce_all(events, &rules);

    for output in &outputs {
        // Recompute replaces a match's prior output rows wholesale;
        // the tables stay append-only within a run.
        store.clear_match_outputs(&output.match_id)?;
        store.write_match_output(output)?;
    }

    println!(
        "recompute finished: {} matches ok, {} failed (rules {})",
        summary.succeeded.len(),
        summary.failed.len(),
        rules.version
    );
    for (match_id, err) in &summary.failed {
        println!("  FAILED {match_id}: {err}");
    }

    if summary.succeeded.is_empty() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

// ── export ─────────────────────────────────────────────────────────

fn cmd_export(args: &[String]) -> Result<ExitCode> {
    let store = open_store(args)?;
    let match_id = required_arg(args, "--match")?;
    let round = optional_arg(args, "--round")
        .map(|r| r.parse::<u32>().context("--round must be an integer"))
        .transpose()?;
    let format = optional_arg(args, "--format").unwrap_or_else(|| "table".to_string());

    let mut snapshots = store.read_snapshots(&match_id)?;
    if let Some(round) = round {
        snapshots.retain(|s| s.round_number == round);
    }
    if snapshots.is_empty() {
        println!("no snapshot data found for match '{match_id}'");
        return Ok(ExitCode::FAILURE);
    }

    match format.as_str() {
        "table" => print_snapshot_table(&snapshots),
        "json" => println!("{}", serde_json::to_string_pretty(&snapshots)?),
        other => bail!("unknown format '{other}' (expected table or json)"),
    }
    Ok(ExitCode::SUCCESS)
}

fn print_snapshot_table(snapshots: &[cs2econ_core::reducer::TeamSnapshot]) {
    println!(
        "{:>5}  {:<4}  {:>10}  {:>8}  {:>9}  {:>9}  {:>9}  {:>10}  checksum",
        "round", "team", "start_bank", "spend", "kill_rew", "win_rew", "loss_bon", "end_bank"
    );
    for s in snapshots {
        println!(
            "{:>5}  {:<4}  {:>10}  {:>8}  {:>9}  {:>9}  {:>9}  {:>10}  {}",
            s.round_number,
            s.team.as_str(),
            s.bank_total_start,
            s.spend_sum,
            s.kill_reward_sum,
            s.win_reward,
            s.loss_bonus,
            s.bank_total_end,
            &s.checksum[..12],
        );
    }
}

// ── verify ─────────────────────────────────────────────────────────

fn cmd_verify(args: &[String]) -> Result<ExitCode> {
    let store = open_store(args)?;
    let rules = Rules::default();

    let match_ids = match optional_arg(args, "--match") {
        Some(id) => vec![id],
        None => store.list_match_ids()?,
    };
    if match_ids.is_empty() {
        println!("no matches found to verify");
        return Ok(ExitCode::FAILURE);
    }

    let mut clean = 0usize;
    let mut drifted = 0usize;
    let mut errored = 0usize;

    for match_id in &match_ids {
        let persisted = store.read_snapshots(match_id)?;
        if persisted.is_empty() {
            println!("{match_id}: no persisted snapshots (run recompute first)");
            errored += 1;
            continue;
        }
        let events = store.scan_events(Some(match_id))?;
        match verify_match(match_id, &persisted, events, &rules) {
            Ok(report) if report.ok => {
                println!("{match_id}: OK ({} snapshots)", persisted.len());
                clean += 1;
            }
            Ok(report) => {
                println!("{match_id}: DRIFTED, {} mismatches", report.mismatches.len());
                for m in &report.mismatches {
                    println!(
                        "  round {:>3} {:<3} {}: expected {}, recomputed {}",
                        m.round_number,
                        m.team.as_str(),
                        m.field,
                        m.expected,
                        m.recomputed
                    );
                }
                drifted += 1;
            }
            Err(err) => {
                println!("{match_id}: verification failed to run: {err}");
                errored += 1;
            }
        }
    }

    println!("verify finished: {clean} clean, {drifted} drifted, {errored} errored");
    if drifted > 0 || errored > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

// ── arg plumbing ───────────────────────────────────────────────────

fn required_arg(args: &[String], flag: &str) -> Result<String> {
    optional_arg(args, flag).with_context(|| format!("missing required {flag} <value>"))
}

fn optional_arg(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn print_usage() {
    eprintln!("econ-cli — CS2 economy pipeline");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  import    --db <path> --events <file.jsonl> [--source <label>]");
    eprintln!("  recompute --db <path> [--match <id>] [--clear]");
    eprintln!("  export    --db <path> --match <id> [--round <n>] [--format table|json]");
    eprintln!("  verify    --db <path> [--match <id>]");
}
