//! Q&A pair persistence.

use super::{format_ts, now, sql_err, ts_col, uuid_col, Database};
use crate::pagination::{KeysetQuery, Page, PageRequest, SortOrder};
use crate::types::{QaInput, QaPair};
use chrono::Duration;
use kbqa_core::{AppError, AppResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, question, answer, created_at, updated_at";

const LISTING: KeysetQuery = KeysetQuery {
    table: "qa_pairs",
    columns: COLUMNS,
    scope_column: None,
    order: SortOrder::NewestFirst,
};

fn map_row(row: &Row<'_>) -> rusqlite::Result<QaPair> {
    Ok(QaPair {
        id: uuid_col(row, 0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        created_at: ts_col(row, 3)?,
        updated_at: ts_col(row, 4)?,
    })
}

fn find(conn: &Connection, id: Uuid) -> AppResult<Option<QaPair>> {
    conn.query_row(
        &format!("SELECT {} FROM qa_pairs WHERE id = ?1", COLUMNS),
        [id.to_string()],
        map_row,
    )
    .optional()
    .map_err(sql_err("read Q&A pair"))
}

/// Repository for the `qa_pairs` table and its full-text index.
#[derive(Clone)]
pub struct QaRepository {
    db: Database,
}

impl QaRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new pair with a fresh time-ordered id.
    pub async fn create(&self, input: QaInput) -> AppResult<QaPair> {
        input.validate()?;

        let ts = now();
        let pair = QaPair {
            id: Uuid::now_v7(),
            question: input.question,
            answer: input.answer,
            created_at: ts,
            updated_at: ts,
        };

        let row = pair.clone();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO qa_pairs (id, question, answer, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        row.id.to_string(),
                        row.question,
                        row.answer,
                        format_ts(&row.created_at),
                        format_ts(&row.updated_at),
                    ],
                )
                .map_err(sql_err("insert Q&A pair"))?;
                Ok(())
            })
            .await?;

        tracing::debug!(id = %pair.id, "Inserted Q&A pair");
        Ok(pair)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<QaPair> {
        self.db
            .with_conn(move |conn| find(conn, id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Q&A pair {} not found", id)))
    }

    /// Rows for the given ids that exist, newest first.
    pub async fn find_many(&self, ids: &[Uuid]) -> AppResult<Vec<QaPair>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<Value> = ids.iter().map(|id| Value::Text(id.to_string())).collect();
        self.db
            .with_conn(move |conn| {
                let placeholders = vec!["?"; keys.len()].join(", ");
                let sql = format!(
                    "SELECT {} FROM qa_pairs WHERE id IN ({}) ORDER BY id DESC",
                    COLUMNS, placeholders
                );
                let mut stmt = conn.prepare(&sql).map_err(sql_err("prepare batch lookup"))?;
                let rows = stmt
                    .query_map(params_from_iter(keys.iter()), map_row)
                    .map_err(sql_err("run batch lookup"))?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(sql_err("read batch lookup"))?;
                Ok(rows)
            })
            .await
    }

    /// Replace question and answer; `updated_at` strictly increases.
    pub async fn update(&self, id: Uuid, input: QaInput) -> AppResult<QaPair> {
        input.validate()?;

        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction().map_err(sql_err("begin transaction"))?;

                let current = find(&tx, id)?
                    .ok_or_else(|| AppError::NotFound(format!("Q&A pair {} not found", id)))?;

                let mut updated_at = now();
                if updated_at <= current.updated_at {
                    updated_at = current.updated_at + Duration::microseconds(1);
                }

                tx.execute(
                    "UPDATE qa_pairs SET question = ?1, answer = ?2, updated_at = ?3 WHERE id = ?4",
                    params![
                        input.question,
                        input.answer,
                        format_ts(&updated_at),
                        id.to_string()
                    ],
                )
                .map_err(sql_err("update Q&A pair"))?;

                tx.commit().map_err(sql_err("commit update"))?;

                Ok(QaPair {
                    question: input.question,
                    answer: input.answer,
                    updated_at,
                    ..current
                })
            })
            .await
    }

    /// Hard delete. Returns whether a row was removed.
    pub async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let removed = self
            .db
            .with_conn(move |conn| {
                conn.execute("DELETE FROM qa_pairs WHERE id = ?1", [id.to_string()])
                    .map_err(sql_err("delete Q&A pair"))
            })
            .await?;
        Ok(removed > 0)
    }

    /// Newest-first keyset listing.
    pub async fn list(&self, request: &PageRequest) -> AppResult<Page<QaPair>> {
        let page = request.resolve()?;
        self.db
            .with_conn(move |conn| LISTING.fetch(conn, None, &page, map_row))
            .await
    }

    /// Ranked full-text matches: best bm25 first, newer first on ties.
    ///
    /// `match_expression` is an FTS5 query built by the search layer.
    pub async fn search_full_text(
        &self,
        match_expression: String,
        limit: usize,
    ) -> AppResult<Vec<QaPair>> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT q.id, q.question, q.answer, q.created_at, q.updated_at
                         FROM qa_pairs_fts
                         JOIN qa_pairs q ON q.pk = qa_pairs_fts.rowid
                         WHERE qa_pairs_fts MATCH ?1
                         ORDER BY bm25(qa_pairs_fts), q.id DESC
                         LIMIT ?2",
                    )
                    .map_err(sql_err("prepare full-text query"))?;
                let rows = stmt
                    .query_map(params![match_expression, limit as i64], map_row)
                    .map_err(sql_err("run full-text query"))?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(sql_err("read full-text matches"))?;
                Ok(rows)
            })
            .await
    }

    pub async fn count(&self) -> AppResult<u64> {
        self.db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM qa_pairs", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as u64)
                .map_err(sql_err("count Q&A pairs"))
            })
            .await
    }
}
