//! Persistence for runs and the knowledge-base log.
//!
//! The engine never touches a store. Callers pick an implementation and hand
//! the engine whatever data it needs.

use crate::error::{Error, Result};
use crate::model::{ConditionTier, KBPattern, KnowledgeBaseEntry, Run, RunStatus, VelocityCategory};
use crate::stats::aggregate;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub trait Store {
    /// Insert or replace a run.
    fn save_run(&self, run: &Run) -> Result<()>;
    fn get_run(&self, id: &str) -> Result<Option<Run>>;
    /// Newest first.
    fn list_runs(&self) -> Result<Vec<Run>>;
    /// Returns whether a run was removed.
    fn delete_run(&self, id: &str) -> Result<bool>;

    /// Append-only.
    fn add_kb_entries(&self, entries: &[KnowledgeBaseEntry]) -> Result<()>;
    fn kb_entries(&self) -> Result<Vec<KnowledgeBaseEntry>>;

    /// Patterns recomputed from the full log on every call.
    fn kb_patterns(&self) -> Result<Vec<KBPattern>> {
        Ok(aggregate(&self.kb_entries()?))
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id                 TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    status             TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    completed_at       TEXT,
    devices            TEXT NOT NULL,
    results            TEXT NOT NULL,
    feedback_submitted INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS knowledge_base (
    id                      TEXT PRIMARY KEY,
    brand                   TEXT NOT NULL,
    model                   TEXT NOT NULL,
    ram                     TEXT NOT NULL,
    storage                 TEXT NOT NULL,
    condition_tier          TEXT NOT NULL,
    recommended_price       INTEGER NOT NULL,
    human_approved_price    INTEGER NOT NULL,
    delta                   INTEGER NOT NULL,
    velocity_category       TEXT NOT NULL,
    human_velocity_override TEXT,
    feedback_note           TEXT,
    run_id                  TEXT NOT NULL,
    created_at              TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Connection,
}

// Raw run row; JSON columns are decoded outside the rusqlite closure
struct RunRow {
    id: String,
    name: String,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    devices: String,
    results: String,
    feedback_submitted: bool,
}

impl RunRow {
    fn into_run(self) -> Result<Run> {
        Ok(Run {
            status: self.status.parse::<RunStatus>().map_err(Error::InvalidInput)?,
            devices: serde_json::from_str(&self.devices)?,
            results: serde_json::from_str(&self.results)?,
            id: self.id,
            name: self.name,
            created_at: self.created_at,
            completed_at: self.completed_at,
            feedback_submitted: self.feedback_submitted,
        })
    }
}

const RUN_COLUMNS: &str =
    "id, name, status, created_at, completed_at, devices, results, feedback_submitted";

fn run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        created_at: row.get(3)?,
        completed_at: row.get(4)?,
        devices: row.get(5)?,
        results: row.get(6)?,
        feedback_submitted: row.get(7)?,
    })
}

fn parse_velocity(idx: usize, value: String) -> rusqlite::Result<VelocityCategory> {
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn })
    }
}

impl Store for SqliteStore {
    fn save_run(&self, run: &Run) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO runs (id, name, status, created_at, completed_at, devices, results, feedback_submitted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.id,
                run.name,
                run.status.as_str(),
                run.created_at,
                run.completed_at,
                serde_json::to_string(&run.devices)?,
                serde_json::to_string(&run.results)?,
                run.feedback_submitted,
            ],
        )?;
        Ok(())
    }

    fn get_run(&self, id: &str) -> Result<Option<Run>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                [id],
                run_row,
            )
            .optional()?;
        row.map(RunRow::into_run).transpose()
    }

    fn list_runs(&self) -> Result<Vec<Run>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM runs ORDER BY created_at DESC", RUN_COLUMNS))?;
        let rows = stmt.query_map([], run_row)?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?.into_run()?);
        }
        Ok(runs)
    }

    fn delete_run(&self, id: &str) -> Result<bool> {
        let n = self.conn.execute("DELETE FROM runs WHERE id = ?1", [id])?;
        Ok(n > 0)
    }

    fn add_kb_entries(&self, entries: &[KnowledgeBaseEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO knowledge_base (id, brand, model, ram, storage, condition_tier,
                    recommended_price, human_approved_price, delta, velocity_category,
                    human_velocity_override, feedback_note, run_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            for e in entries {
                stmt.execute(params![
                    e.id,
                    e.brand,
                    e.model,
                    e.ram,
                    e.storage,
                    e.condition_tier.as_str(),
                    e.recommended_price,
                    e.human_approved_price,
                    e.delta,
                    e.velocity_category.as_str(),
                    e.human_velocity_override.map(|v| v.as_str()),
                    e.feedback_note,
                    e.run_id,
                    e.created_at,
                ])?;
            }
        }
        tx.commit()?;
        tracing::info!(entries = entries.len(), "appended knowledge base entries");
        Ok(())
    }

    fn kb_entries(&self) -> Result<Vec<KnowledgeBaseEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, brand, model, ram, storage, condition_tier, recommended_price,
                    human_approved_price, delta, velocity_category, human_velocity_override,
                    feedback_note, run_id, created_at
             FROM knowledge_base
             ORDER BY created_at",
        )?;

        let rows = stmt.query_map([], |row| {
            let override_raw: Option<String> = row.get(10)?;
            Ok(KnowledgeBaseEntry {
                id: row.get(0)?,
                brand: row.get(1)?,
                model: row.get(2)?,
                ram: row.get(3)?,
                storage: row.get(4)?,
                condition_tier: ConditionTier::from(row.get::<_, String>(5)?),
                recommended_price: row.get(6)?,
                human_approved_price: row.get(7)?,
                delta: row.get(8)?,
                velocity_category: parse_velocity(9, row.get(9)?)?,
                human_velocity_override: override_raw.map(|v| parse_velocity(10, v)).transpose()?,
                feedback_note: row.get(11)?,
                run_id: row.get(12)?,
                created_at: row.get(13)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Process-local store, for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    runs: Mutex<Vec<Run>>,
    entries: Mutex<Vec<KnowledgeBaseEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "memory store lock poisoned"))
}

impl Store for MemoryStore {
    fn save_run(&self, run: &Run) -> Result<()> {
        let mut runs = self.runs.lock().map_err(poisoned)?;
        match runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run.clone(),
            None => runs.push(run.clone()),
        }
        Ok(())
    }

    fn get_run(&self, id: &str) -> Result<Option<Run>> {
        let runs = self.runs.lock().map_err(poisoned)?;
        Ok(runs.iter().find(|r| r.id == id).cloned())
    }

    fn list_runs(&self) -> Result<Vec<Run>> {
        let mut runs = self.runs.lock().map_err(poisoned)?.clone();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    fn delete_run(&self, id: &str) -> Result<bool> {
        let mut runs = self.runs.lock().map_err(poisoned)?;
        let before = runs.len();
        runs.retain(|r| r.id != id);
        Ok(runs.len() != before)
    }

    fn add_kb_entries(&self, entries: &[KnowledgeBaseEntry]) -> Result<()> {
        self.entries.lock().map_err(poisoned)?.extend_from_slice(entries);
        Ok(())
    }

    fn kb_entries(&self) -> Result<Vec<KnowledgeBaseEntry>> {
        Ok(self.entries.lock().map_err(poisoned)?.clone())
    }
}
