//! Relational store: a bounded SQLite connection pool plus per-entity
//! repositories.
//!
//! Every statement runs on the blocking thread pool. A semaphore permit is
//! held for the whole time a connection is checked out, so the number of open
//! connections never exceeds `max_open_connections`.

mod conversation;
mod ledger;
mod qa;
mod schema;

pub use conversation::ConversationRepository;
pub use ledger::{IndexLedger, IndexState, LedgerEntry};
pub use qa::QaRepository;

use chrono::{DateTime, SubsecRound, Utc};
use kbqa_core::config::DatabaseConfig;
use kbqa_core::{AppError, AppResult};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Shared handle to the relational store.
#[derive(Clone)]
pub struct Database {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    path: PathBuf,
    memory: bool,
    busy_timeout_ms: u64,
    max_idle: usize,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database and apply the schema.
    pub fn open(config: &DatabaseConfig) -> AppResult<Self> {
        let memory = config.is_memory();
        // A private in-memory database lives and dies with its only connection
        let (max_open, max_idle) = if memory {
            (1, 1)
        } else {
            (
                config.max_open_connections.max(1),
                config.max_idle_connections.clamp(1, config.max_open_connections.max(1)),
            )
        };

        tracing::info!(
            path = ?config.path,
            max_open,
            max_idle,
            "Opening relational store"
        );

        if !memory {
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::Internal(format!("Failed to create database directory: {}", e))
                    })?;
                }
            }
        }

        let inner = PoolInner {
            path: config.path.clone(),
            memory,
            busy_timeout_ms: config.busy_timeout_ms,
            max_idle,
            permits: Arc::new(Semaphore::new(max_open)),
            idle: Mutex::new(Vec::with_capacity(max_idle)),
        };

        let conn = inner.connect()?;
        schema::apply(&conn)?;
        inner.idle.lock().push(conn);

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Private in-memory database, mainly for tests.
    pub fn memory() -> AppResult<Self> {
        Self::open(&DatabaseConfig::memory())
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    ///
    /// Waits for a permit when the pool is exhausted. Dropping the returned
    /// future before the closure starts releases the permit; once started,
    /// the closure runs to completion and returns its connection.
    pub async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("Connection pool closed: {}", e)))?;

        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut conn = inner.checkout()?;
            let result = f(&mut conn);
            inner.checkin(conn);
            result
        })
        .await
        .map_err(|e| AppError::Internal(format!("Database task failed: {}", e)))?
    }

    /// Number of idle connections currently held.
    pub fn idle_connections(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Number of connections that may still be checked out.
    pub fn available_permits(&self) -> usize {
        self.inner.permits.available_permits()
    }
}

impl PoolInner {
    fn connect(&self) -> AppResult<Connection> {
        let conn = if self.memory {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.path)
        }
        .map_err(sql_err("open database"))?;

        if !self.memory {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
                .map_err(sql_err("enable WAL"))?;
        }
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        ))
        .map_err(sql_err("configure connection"))?;

        Ok(conn)
    }

    fn checkout(&self) -> AppResult<Connection> {
        if let Some(conn) = self.idle.lock().pop() {
            return Ok(conn);
        }
        if self.memory {
            return Err(AppError::Internal(
                "In-memory database connection was lost".to_string(),
            ));
        }
        tracing::debug!(path = ?self.path, "Opening new pooled connection");
        self.connect()
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

/// Map a rusqlite error to an internal error naming the failed action.
pub(crate) fn sql_err(action: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::Internal(format!("Failed to {}: {}", action, e))
}

/// Current time truncated to the stored precision.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_database_uses_one_connection() {
        let db = Database::memory().unwrap();
        assert_eq!(db.idle_connections(), 1);
        assert_eq!(db.available_permits(), 1);

        let tables: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('qa_pairs', 'conversations', 'messages', 'index_ledger')",
                    [],
                    |row| row.get(0),
                )
                .map_err(sql_err("count tables"))
            })
            .await
            .unwrap();
        assert_eq!(tables, 4);
        assert_eq!(db.idle_connections(), 1);
    }

    #[tokio::test]
    async fn test_file_database_enables_wal_and_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested/kb.sqlite"),
            ..Default::default()
        };
        let db = Database::open(&config).unwrap();

        let (mode, fk): (String, i64) = db
            .with_conn(|conn| {
                let mode = conn
                    .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(sql_err("read journal mode"))?;
                let fk = conn
                    .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                    .map_err(sql_err("read foreign keys"))?;
                Ok((mode, fk))
            })
            .await
            .unwrap();

        assert_eq!(mode.to_lowercase(), "wal");
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrent_checkouts() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("kb.sqlite"),
            max_open_connections: 3,
            max_idle_connections: 2,
            ..Default::default()
        };
        let db = Database::open(&config).unwrap();

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move {
                    db.with_conn(|conn| {
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                            .map_err(sql_err("select"))
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 1);
        }

        assert_eq!(db.available_permits(), 3);
        assert!(db.idle_connections() <= 2);
    }

    #[test]
    fn test_timestamp_round_trip_keeps_micros() {
        let ts = now();
        let formatted = format_ts(&ts);
        assert!(formatted.ends_with('Z'));
        let parsed = DateTime::parse_from_rfc3339(&formatted)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, ts);
    }
}
