//! Local SQLite-backed vector index.
//!
//! Vectors are stored as little-endian `f32` blobs in a file separate from the
//! relational store and scored exactly with cosine similarity.

use super::{rank_exact, VectorIndex, VectorMatch, VectorMetadata, VectorRecord};
use crate::db::sql_err;
use async_trait::async_trait;
use kbqa_core::{AppError, AppResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIndex {
    /// Open or create the index file. `:memory:` opens a private index.
    pub fn open(path: &Path) -> AppResult<Self> {
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::Internal(format!("Failed to create index directory: {}", e))
                    })?;
                }
            }
            Connection::open(path)
        }
        .map_err(sql_err("open vector index"))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL
            );
            "#,
        )
        .map_err(sql_err("create vector table"))?;

        tracing::debug!("Initialized SQLite vector index at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| AppError::Internal(format!("Vector index task failed: {}", e)))?
    }
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Internal(format!(
            "Invalid embedding blob length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, record: VectorRecord) -> AppResult<()> {
        let metadata = serde_json::to_string(&record.metadata)?;
        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO vectors (id, embedding, metadata) VALUES (?1, ?2, ?3)",
                params![record.id, embedding_to_bytes(&record.values), metadata],
            )
            .map_err(sql_err("upsert vector"))?;
            Ok(())
        })
        .await
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<VectorMatch>> {
        let query = vector.to_vec();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id, embedding, metadata FROM vectors")
                .map_err(sql_err("prepare vector scan"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(sql_err("scan vectors"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_err("read vectors"))?;

            let mut records = Vec::with_capacity(rows.len());
            for (id, blob, metadata) in rows {
                records.push(VectorRecord {
                    id,
                    values: bytes_to_embedding(&blob)?,
                    metadata: serde_json::from_str::<VectorMetadata>(&metadata)?,
                });
            }

            let matches = rank_exact(&query, &records, top_k);
            tracing::debug!(
                "Scored {} vectors, returning top {}",
                records.len(),
                matches.len()
            );
            Ok(matches)
        })
        .await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM vectors WHERE id = ?1", [id])
                .map_err(sql_err("delete vector"))?;
            Ok(())
        })
        .await
    }
}
