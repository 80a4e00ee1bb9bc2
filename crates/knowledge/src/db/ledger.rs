//! Bookkeeping for the vector-index leg of each Q&A write.
//!
//! One row per entity whose index state is not known to be clean. A
//! successful de-index removes the row entirely.

use super::{format_ts, now, sql_err, ts_col, uuid_col, Database};
use chrono::{DateTime, Utc};
use kbqa_core::{AppError, AppResult};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Vector-index state of a Q&A pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Indexing,
    Reindexing,
    Deindexing,
    Indexed,
    IndexFailed,
    DeindexFailed,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::Indexing => "indexing",
            IndexState::Reindexing => "reindexing",
            IndexState::Deindexing => "deindexing",
            IndexState::Indexed => "indexed",
            IndexState::IndexFailed => "index_failed",
            IndexState::DeindexFailed => "deindex_failed",
        }
    }

    /// An attempt is starting rather than finishing.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            IndexState::Indexing | IndexState::Reindexing | IndexState::Deindexing
        )
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indexing" => Ok(IndexState::Indexing),
            "reindexing" => Ok(IndexState::Reindexing),
            "deindexing" => Ok(IndexState::Deindexing),
            "indexed" => Ok(IndexState::Indexed),
            "index_failed" => Ok(IndexState::IndexFailed),
            "deindex_failed" => Ok(IndexState::DeindexFailed),
            other => Err(AppError::Internal(format!("unknown index state '{}'", other))),
        }
    }
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entity_id: Uuid,
    pub state: IndexState,
    pub last_error: Option<String>,
    /// Number of attempts started for this entity
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let state: String = row.get(1)?;
    Ok(LedgerEntry {
        entity_id: uuid_col(row, 0)?,
        state: state
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
        last_error: row.get(2)?,
        attempts: row.get::<_, i64>(3)? as u32,
        updated_at: ts_col(row, 4)?,
    })
}

#[derive(Clone)]
pub struct IndexLedger {
    db: Database,
}

impl IndexLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a transition. In-flight states count as a new attempt.
    pub async fn record(
        &self,
        entity_id: Uuid,
        state: IndexState,
        last_error: Option<String>,
    ) -> AppResult<()> {
        let attempt = i64::from(state.is_in_flight());
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO index_ledger (entity_id, state, last_error, attempts, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (entity_id) DO UPDATE SET
                         state = excluded.state,
                         last_error = excluded.last_error,
                         attempts = index_ledger.attempts + excluded.attempts,
                         updated_at = excluded.updated_at",
                    params![
                        entity_id.to_string(),
                        state.as_str(),
                        last_error,
                        attempt,
                        format_ts(&now()),
                    ],
                )
                .map_err(sql_err("record index state"))?;
                Ok(())
            })
            .await
    }

    pub async fn clear(&self, entity_id: Uuid) -> AppResult<()> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "DELETE FROM index_ledger WHERE entity_id = ?1",
                    [entity_id.to_string()],
                )
                .map_err(sql_err("clear index state"))?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, entity_id: Uuid) -> AppResult<Option<LedgerEntry>> {
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT entity_id, state, last_error, attempts, updated_at
                     FROM index_ledger WHERE entity_id = ?1",
                    [entity_id.to_string()],
                    map_entry,
                )
                .optional()
                .map_err(sql_err("read index state"))
            })
            .await
    }

    /// Entities currently in any of `states`, oldest first.
    pub async fn in_states(&self, states: &[IndexState]) -> AppResult<Vec<LedgerEntry>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<&'static str> = states.iter().map(IndexState::as_str).collect();
        self.db
            .with_conn(move |conn| {
                let placeholders = vec!["?"; names.len()].join(", ");
                let sql = format!(
                    "SELECT entity_id, state, last_error, attempts, updated_at
                     FROM index_ledger WHERE state IN ({}) ORDER BY entity_id ASC",
                    placeholders
                );
                let mut stmt = conn.prepare(&sql).map_err(sql_err("prepare ledger scan"))?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(names.iter()), map_entry)
                    .map_err(sql_err("scan ledger"))?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(sql_err("read ledger rows"))?;
                Ok(rows)
            })
            .await
    }
}
