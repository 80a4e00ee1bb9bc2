//! Cursor pagination over time-ordered identifiers.
//!
//! Every listable table is keyed by a UUIDv7 stored as lowercase hyphenated
//! text, so `ORDER BY id` is creation order and a cursor is simply the id of
//! the row at a page boundary. A page is fetched with `limit + 1` rows to
//! learn whether another page exists in the travel direction.

use crate::db::sql_err;
use crate::types::{Conversation, Message, QaPair};
use kbqa_core::{AppError, AppResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Page size used when none (or a non-positive one) is requested.
pub const DEFAULT_LIMIT: usize = 10;

/// Largest page size served; larger requests are clamped.
pub const MAX_LIMIT: usize = 100;

/// Travel direction relative to the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Next,
    Prev,
}

impl FromStr for Direction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "next" => Ok(Direction::Next),
            "prev" => Ok(Direction::Prev),
            other => Err(AppError::Validation(format!(
                "direction must be 'next' or 'prev' (got '{}')",
                other
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Next => f.write_str("next"),
            Direction::Prev => f.write_str("prev"),
        }
    }
}

/// Caller-supplied pagination parameters, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub direction: Direction,
}

impl PageRequest {
    pub fn first(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn after(cursor: impl Into<String>, limit: i64) -> Self {
        Self {
            limit: Some(limit),
            cursor: Some(cursor.into()),
            direction: Direction::Next,
        }
    }

    pub fn before(cursor: impl Into<String>, limit: i64) -> Self {
        Self {
            limit: Some(limit),
            cursor: Some(cursor.into()),
            direction: Direction::Prev,
        }
    }

    /// Clamp the limit and parse the cursor.
    ///
    /// A malformed cursor is a validation error; it is never treated as
    /// "no cursor".
    pub fn resolve(&self) -> AppResult<ResolvedPage> {
        let limit = clamp_limit(self.limit);

        let cursor = match self.cursor.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_cursor(raw)?),
        };

        Ok(ResolvedPage {
            limit,
            cursor,
            direction: self.direction,
        })
    }
}

/// Apply the default and the upper bound to a requested page size.
pub fn clamp_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(n) if n >= 1 => (n as usize).min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    }
}

/// Parse a cursor token back into the id it encodes.
pub fn parse_cursor(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| AppError::Validation(format!("invalid cursor '{}': {}", raw, e)))
}

/// Validated pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPage {
    pub limit: usize,
    pub cursor: Option<Uuid>,
    pub direction: Direction,
}

impl ResolvedPage {
    /// Whether rows are read against the display order and must be flipped.
    /// Without a cursor every request is a first page.
    fn is_backward(&self) -> bool {
        self.cursor.is_some() && self.direction == Direction::Prev
    }
}

/// Pagination metadata returned alongside a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<String>,
    pub has_next: bool,
    pub has_prev: bool,
}

/// One page of rows in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: CursorPagination,
}

impl<T> Page<T> {
    pub fn ids(&self) -> Vec<Uuid>
    where
        T: Keyed,
    {
        self.data.iter().map(Keyed::key).collect()
    }
}

/// Entities addressable by their time-ordered id.
pub trait Keyed {
    fn key(&self) -> Uuid;
}

impl Keyed for QaPair {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Keyed for Conversation {
    fn key(&self) -> Uuid {
        self.id
    }
}

impl Keyed for Message {
    fn key(&self) -> Uuid {
        self.id
    }
}

/// Display order of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Most recent first (Q&A pairs, conversations)
    NewestFirst,
    /// Chronological (messages within a conversation)
    OldestFirst,
}

/// Description of a keyset-paginated listing.
#[derive(Debug, Clone, Copy)]
pub struct KeysetQuery {
    pub table: &'static str,
    pub columns: &'static str,
    /// Optional equality filter column, e.g. `conversation_id`
    pub scope_column: Option<&'static str>,
    pub order: SortOrder,
}

impl KeysetQuery {
    /// Build the SQL for a resolved page request.
    ///
    /// Travelling forward in display order uses the display sort; travelling
    /// backward inverts both the comparison and the sort.
    pub(crate) fn sql(&self, page: &ResolvedPage) -> String {
        let ascending = match (self.order, page.is_backward()) {
            (SortOrder::NewestFirst, false) | (SortOrder::OldestFirst, true) => false,
            (SortOrder::NewestFirst, true) | (SortOrder::OldestFirst, false) => true,
        };

        let mut predicates = Vec::new();
        if let Some(column) = self.scope_column {
            predicates.push(format!("{} = ?", column));
        }
        if page.cursor.is_some() {
            predicates.push(if ascending { "id > ?" } else { "id < ?" }.to_string());
        }

        let where_sql = if predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", predicates.join(" AND "))
        };

        format!(
            "SELECT {} FROM {}{} ORDER BY id {} LIMIT ?",
            self.columns,
            self.table,
            where_sql,
            if ascending { "ASC" } else { "DESC" }
        )
    }

    /// Fetch one page.
    ///
    /// `scope` supplies the value for `scope_column` when one is configured.
    pub fn fetch<T, F>(
        &self,
        conn: &Connection,
        scope: Option<&str>,
        page: &ResolvedPage,
        map_row: F,
    ) -> AppResult<Page<T>>
    where
        T: Keyed,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let sql = self.sql(page);

        let mut params: Vec<Value> = Vec::with_capacity(3);
        if self.scope_column.is_some() {
            let scope = scope.ok_or_else(|| {
                AppError::Internal(format!("missing scope value for {}", self.table))
            })?;
            params.push(Value::Text(scope.to_string()));
        }
        if let Some(cursor) = page.cursor {
            params.push(Value::Text(cursor.to_string()));
        }
        params.push(Value::Integer((page.limit + 1) as i64));

        let mut stmt = conn.prepare(&sql).map_err(sql_err("prepare page query"))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), map_row)
            .map_err(sql_err("run page query"))?
            .collect::<rusqlite::Result<Vec<T>>>()
            .map_err(sql_err("read page rows"))?;

        tracing::debug!(
            table = self.table,
            limit = page.limit,
            direction = %page.direction,
            cursor = page.cursor.is_some(),
            fetched = rows.len(),
            "Fetched page"
        );

        Ok(assemble_page(rows, page))
    }
}

/// Trim, reorder and annotate fetched rows.
///
/// `rows` arrive in fetch order and may hold one extra row past the limit.
pub fn assemble_page<T: Keyed>(mut rows: Vec<T>, page: &ResolvedPage) -> Page<T> {
    let has_next = rows.len() > page.limit;
    rows.truncate(page.limit);

    if page.is_backward() {
        rows.reverse();
    }

    let pagination = CursorPagination {
        next_cursor: rows.last().map(|r| r.key().to_string()),
        prev_cursor: rows.first().map(|r| r.key().to_string()),
        has_next,
        has_prev: page.cursor.is_some(),
    };

    Page {
        data: rows,
        pagination,
    }
}
