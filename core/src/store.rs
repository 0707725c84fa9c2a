//! SQLite audit persistence.
//!
//! RULE: Only store.rs talks to the database. The composer appends;
//! export tooling reads. Nothing in the policy path ever reads back.

use crate::{
    error::SimResult,
    rng::EpisodeSeeds,
    types::{Action, Timestamp},
};
use rusqlite::{params, Connection};

pub struct AuditStore {
    conn: Connection,
}

/// One persisted step, as read back by export/replay tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRow {
    pub step: u64,
    pub cgm: f64,
    pub basal: f64,
    pub bolus: f64,
    pub carbs: f64,
    pub reward: f64,
}

impl AuditStore {
    /// Open (or create) the audit database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance for exporters.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_audit.sql"))?;
        Ok(())
    }

    // ── Episodes ───────────────────────────────────────────────

    pub fn insert_episode(
        &self,
        episode_id: &str,
        root_seed: u64,
        seeds: &EpisodeSeeds,
        patient_id: &str,
        start_time: Timestamp,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO episode
                (episode_id, patient_id, root_seed, base_seed,
                 sensor_seed, scenario_seed, patient_seed, start_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                episode_id,
                patient_id,
                root_seed as i64,
                seeds.base as i64,
                seeds.sensor as i64,
                seeds.scenario as i64,
                seeds.patient as i64,
                start_time.to_string(),
            ],
        )?;
        Ok(())
    }

    // ── Step log ───────────────────────────────────────────────

    pub fn append_step(
        &self,
        episode_id: &str,
        step: u64,
        cgm: f64,
        action: &Action,
        carbs: f64,
        reward: f64,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO step_log (episode_id, step, cgm, basal, bolus, carbs, reward)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                episode_id,
                step as i64,
                cgm,
                action.basal,
                action.bolus,
                carbs,
                reward,
            ],
        )?;
        Ok(())
    }

    pub fn steps_for_episode(&self, episode_id: &str) -> SimResult<Vec<StepRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT step, cgm, basal, bolus, carbs, reward
             FROM step_log WHERE episode_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![episode_id], |row| {
                Ok(StepRow {
                    step: row.get::<_, i64>(0)? as u64,
                    cgm: row.get(1)?,
                    basal: row.get(2)?,
                    bolus: row.get(3)?,
                    carbs: row.get(4)?,
                    reward: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn episode_count(&self, episode_id: &str) -> SimResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM episode WHERE episode_id = ?1",
            params![episode_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
