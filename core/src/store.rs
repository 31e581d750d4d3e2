//! SQLite persistence layer — the only component touching storage.
//!
//! RULE: Only store.rs talks to the database. The reducer and driver
//! consume plain vectors of events and rows; swapping the storage
//! format touches this file alone.
//!
//! The event scan orders rows by the canonical sort key, but that is
//! advisory only: ordering.rs re-establishes the total order on every
//! run regardless of what the storage layer returns.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::driver::StateRow;
use crate::error::EconResult;
use crate::event::{Event, EventKind, EventPayload};
use crate::reducer::{BalanceAt, BalanceRecord, TeamSnapshot};
use crate::types::Team;

pub struct EconStore {
    conn: Connection,
}

impl EconStore {
    /// Open (or create) the pipeline database at `path`.
    pub fn open(path: &str) -> EconResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EconResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EconResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Events (input) ─────────────────────────────────────────────

    /// Append raw events, stamping ingest provenance. The stamp is
    /// metadata for operators; the reducer never reads it.
    pub fn insert_events(&self, events: &[Event], source: &str) -> EconResult<usize> {
        let ts = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare(
            "INSERT INTO event (
                match_id, round_number, tick, event_id, kind,
                actor_steamid, victim_steamid, team, weapon,
                price, amount, payload, ingest_source, ts_ingested
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        for event in events {
            let payload = match &event.payload {
                Some(p) => Some(serde_json::to_string(p)?),
                None => None,
            };
            stmt.execute(params![
                event.match_id,
                event.round_number as i64,
                event.tick,
                event.event_id,
                event.kind.as_str(),
                event.actor_steamid,
                event.victim_steamid,
                event.team.map(|t| t.as_str()),
                event.weapon,
                event.price,
                event.amount,
                payload,
                source,
                ts,
            ])?;
        }
        log::info!("ingested {} events from '{source}'", events.len());
        Ok(events.len())
    }

    /// Scan events, optionally filtered to one match.
    pub fn scan_events(&self, match_id: Option<&str>) -> EconResult<Vec<Event>> {
        let sql = "SELECT match_id, round_number, tick, event_id, kind,
                          actor_steamid, victim_steamid, team, weapon,
                          price, amount, payload
                   FROM event
                   WHERE (?1 IS NULL OR match_id = ?1)
                   ORDER BY match_id, round_number, tick, event_id";
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![match_id], |row| {
            let kind_raw: String = row.get(4)?;
            let kind = EventKind::parse(&kind_raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    format!("unknown event kind '{kind_raw}'").into(),
                )
            })?;
            let team_raw: Option<String> = row.get(7)?;
            let team = match team_raw {
                Some(raw) => Some(Team::parse(&raw).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        7,
                        rusqlite::types::Type::Text,
                        format!("unknown team '{raw}'").into(),
                    )
                })?),
                None => None,
            };
            let payload_raw: Option<String> = row.get(11)?;
            let payload = match payload_raw {
                Some(raw) => Some(
                    serde_json::from_str::<EventPayload>(&raw).map_err(|err| {
                        rusqlite::Error::FromSqlConversionFailure(
                            11,
                            rusqlite::types::Type::Text,
                            Box::new(err),
                        )
                    })?,
                ),
                None => None,
            };
            Ok(Event {
                match_id: row.get(0)?,
                round_number: row.get::<_, i64>(1)? as u32,
                tick: row.get(2)?,
                event_id: row.get(3)?,
                kind,
                actor_steamid: row.get(5)?,
                victim_steamid: row.get(6)?,
                team,
                weapon: row.get(8)?,
                price: row.get(9)?,
                amount: row.get(10)?,
                payload,
            })
        })?;
        let events = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Distinct match ids present in the event table, sorted.
    pub fn list_match_ids(&self) -> EconResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT match_id FROM event ORDER BY match_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // ── Balances (output) ──────────────────────────────────────────

    pub fn append_balances(&self, rows: &[BalanceRecord]) -> EconResult<()> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO balance (
                match_id, round_number, player_steamid, team, at,
                bank, equipment_value, loss_streak, cap_hit, rules_version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.match_id,
                row.round_number as i64,
                row.player_steamid,
                row.team.as_str(),
                row.at.as_str(),
                row.bank,
                row.equipment_value,
                row.loss_streak as i64,
                row.cap_hit,
                row.rules_version,
            ])?;
        }
        Ok(())
    }

    pub fn read_balances(&self, match_id: &str) -> EconResult<Vec<BalanceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT match_id, round_number, player_steamid, team, at,
                    bank, equipment_value, loss_streak, cap_hit, rules_version
             FROM balance WHERE match_id = ?1
             ORDER BY round_number, at DESC, player_steamid",
        )?;
        let rows = stmt.query_map(params![match_id], |row| {
            let team_raw: String = row.get(3)?;
            let team = Team::parse(&team_raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("unknown team '{team_raw}'").into(),
                )
            })?;
            let at_raw: String = row.get(4)?;
            let at = BalanceAt::parse(&at_raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    format!("unknown balance checkpoint '{at_raw}'").into(),
                )
            })?;
            Ok(BalanceRecord {
                match_id: row.get(0)?,
                round_number: row.get::<_, i64>(1)? as u32,
                player_steamid: row.get(2)?,
                team,
                at,
                bank: row.get(5)?,
                equipment_value: row.get(6)?,
                loss_streak: row.get::<_, i64>(7)? as u32,
                cap_hit: row.get(8)?,
                rules_version: row.get(9)?,
            })
        })?;
        let balances = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(balances)
    }

    // ── Team snapshots (output) ────────────────────────────────────

    pub fn append_snapshots(&self, rows: &[TeamSnapshot]) -> EconResult<()> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO team_snapshot (
                match_id, round_number, team,
                bank_total_start, equip_total_start, spend_sum,
                kill_reward_sum, win_reward, loss_bonus,
                plant_bonus_team, planter_bonus, defuse_bonus, money_sum,
                bank_total_end, equip_total_end,
                inputs_event_ids, checksum, rules_version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                       ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        )?;
        for row in rows {
            let lineage = serde_json::to_string(&row.inputs_event_ids)?;
            stmt.execute(params![
                row.match_id,
                row.round_number as i64,
                row.team.as_str(),
                row.bank_total_start,
                row.equip_total_start,
                row.spend_sum,
                row.kill_reward_sum,
                row.win_reward,
                row.loss_bonus,
                row.plant_bonus_team,
                row.planter_bonus,
                row.defuse_bonus,
                row.money_sum,
                row.bank_total_end,
                row.equip_total_end,
                lineage,
                row.checksum,
                row.rules_version,
            ])?;
        }
        Ok(())
    }

    pub fn read_snapshots(&self, match_id: &str) -> EconResult<Vec<TeamSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT match_id, round_number, team,
                    bank_total_start, equip_total_start, spend_sum,
                    kill_reward_sum, win_reward, loss_bonus,
                    plant_bonus_team, planter_bonus, defuse_bonus, money_sum,
                    bank_total_end, equip_total_end,
                    inputs_event_ids, checksum, rules_version
             FROM team_snapshot WHERE match_id = ?1
             ORDER BY round_number, team",
        )?;
        let rows = stmt.query_map(params![match_id], |row| {
            let team_raw: String = row.get(2)?;
            let team = Team::parse(&team_raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("unknown team '{team_raw}'").into(),
                )
            })?;
            let lineage_raw: String = row.get(15)?;
            let inputs_event_ids: Vec<String> = serde_json::from_str(&lineage_raw)
                .map_err(|err| {
                    rusqlite::Error::FromSqlConversionFailure(
                        15,
                        rusqlite::types::Type::Text,
                        Box::new(err),
                    )
                })?;
            Ok(TeamSnapshot {
                match_id: row.get(0)?,
                round_number: row.get::<_, i64>(1)? as u32,
                team,
                bank_total_start: row.get(3)?,
                equip_total_start: row.get(4)?,
                spend_sum: row.get(5)?,
                kill_reward_sum: row.get(6)?,
                win_reward: row.get(7)?,
                loss_bonus: row.get(8)?,
                plant_bonus_team: row.get(9)?,
                planter_bonus: row.get(10)?,
                defuse_bonus: row.get(11)?,
                money_sum: row.get(12)?,
                bank_total_end: row.get(13)?,
                equip_total_end: row.get(14)?,
                inputs_event_ids,
                checksum: row.get(16)?,
                rules_version: row.get(17)?,
            })
        })?;
        let snapshots = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    // ── Round-carried state (output) ───────────────────────────────

    pub fn append_states(&self, rows: &[StateRow]) -> EconResult<()> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO round_state (
                match_id, round_number, team, player_steamid,
                loss_streak_after, zero_income_next_round
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.match_id,
                row.round_number as i64,
                row.team.map(|t| t.as_str()),
                row.player_steamid,
                row.loss_streak_after.map(|s| s as i64),
                row.zero_income_next_round,
            ])?;
        }
        Ok(())
    }

    /// Write one match's full output in one go.
    pub fn write_match_output(&self, output: &crate::driver::MatchOutput) -> EconResult<()> {
        self.append_balances(&output.balances)?;
        self.append_snapshots(&output.snapshots)?;
        self.append_states(&output.states)?;
        Ok(())
    }

    /// Remove all output rows (not events) for a fresh recompute.
    pub fn clear_outputs(&self) -> EconResult<()> {
        self.conn.execute("DELETE FROM balance", [])?;
        self.conn.execute("DELETE FROM team_snapshot", [])?;
        self.conn.execute("DELETE FROM round_state", [])?;
        log::info!("cleared all output tables");
        Ok(())
    }

    /// Remove output rows for one match only.
    pub fn clear_match_outputs(&self, match_id: &str) -> EconResult<()> {
        self.conn
            .execute("DELETE FROM balance WHERE match_id = ?1", params![match_id])?;
        self.conn.execute(
            "DELETE FROM team_snapshot WHERE match_id = ?1",
            params![match_id],
        )?;
        self.conn.execute(
            "DELETE FROM round_state WHERE match_id = ?1",
            params![match_id],
        )?;
        Ok(())
    }
}
