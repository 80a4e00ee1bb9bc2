//! Write-through indexing of Q&A pairs into the vector index.
//!
//! The relational write always happens first and is owned by the caller.
//! This module runs the secondary leg: embed, then upsert or delete. A
//! failure here never fails the operation; it is logged, recorded in the
//! index ledger, and reported back as an [`IndexState`] or a boolean.

use crate::db::{IndexLedger, IndexState};
use crate::embeddings::EmbeddingProvider;
use crate::types::QaPair;
use crate::vector_index::{VectorIndex, VectorMetadata, VectorRecord};
use kbqa_core::{AppError, AppResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Text embedded for a Q&A pair. Index and query sides must agree on it.
pub fn compose_embedding_text(question: &str, answer: &str) -> String {
    format!("Question: {}\nAnswer: {}", question, answer)
}

/// Per-call time limits for external collaborators.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub embed: Duration,
    pub index: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            embed: Duration::from_secs(30),
            index: Duration::from_secs(30),
        }
    }
}

/// Await `fut` for at most `limit`; elapsed time is an upstream failure.
pub(crate) async fn bounded<T, F>(what: &str, limit: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        AppError::UpstreamUnavailable(format!("{} timed out after {:?}", what, limit))
    })?
}

/// Runs the vector-index leg for Q&A writes.
#[derive(Clone)]
pub struct IndexingCoordinator {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    ledger: IndexLedger,
    deadlines: Deadlines,
}

impl IndexingCoordinator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        ledger: IndexLedger,
        deadlines: Deadlines,
    ) -> Self {
        Self {
            embedder,
            index,
            ledger,
            deadlines,
        }
    }

    pub fn ledger(&self) -> &IndexLedger {
        &self.ledger
    }

    /// Embed and upsert a committed pair.
    ///
    /// Returns [`IndexState::Indexed`] or [`IndexState::IndexFailed`].
    pub async fn index(&self, pair: &QaPair, reindex: bool) -> IndexState {
        let start = if reindex {
            IndexState::Reindexing
        } else {
            IndexState::Indexing
        };
        self.note(pair.id, start, None).await;

        match self.upsert(pair).await {
            Ok(()) => {
                tracing::info!(
                    id = %pair.id,
                    backend = self.index.backend_name(),
                    "Indexed Q&A pair"
                );
                self.note(pair.id, IndexState::Indexed, None).await;
                IndexState::Indexed
            }
            Err(e) => {
                tracing::warn!(
                    id = %pair.id,
                    error = %e,
                    "Vector index leg failed; pair is stored but not searchable by similarity"
                );
                self.note(pair.id, IndexState::IndexFailed, Some(e.to_string()))
                    .await;
                IndexState::IndexFailed
            }
        }
    }

    /// Remove a deleted pair's vector. Returns whether the removal succeeded.
    pub async fn deindex(&self, id: Uuid) -> bool {
        self.note(id, IndexState::Deindexing, None).await;

        let key = id.to_string();
        match bounded(
            "vector delete",
            self.deadlines.index,
            self.index.delete(&key),
        )
        .await
        {
            Ok(()) => {
                tracing::info!(id = %id, "Removed Q&A pair from vector index");
                if let Err(e) = self.ledger.clear(id).await {
                    tracing::warn!(id = %id, error = %e, "Failed to clear index ledger entry");
                }
                true
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Vector index delete failed");
                self.note(id, IndexState::DeindexFailed, Some(e.to_string()))
                    .await;
                false
            }
        }
    }

    async fn upsert(&self, pair: &QaPair) -> AppResult<()> {
        let text = compose_embedding_text(&pair.question, &pair.answer);
        let values = bounded("embedding", self.deadlines.embed, self.embedder.embed(&text)).await?;

        let record = VectorRecord {
            id: pair.id.to_string(),
            values,
            metadata: VectorMetadata::from(pair),
        };
        bounded("vector upsert", self.deadlines.index, self.index.upsert(record)).await
    }

    /// Ledger writes are bookkeeping only; failures are logged and dropped.
    async fn note(&self, id: Uuid, state: IndexState, error: Option<String>) {
        if let Err(e) = self.ledger.record(id, state, error).await {
            tracing::warn!(id = %id, state = %state, error = %e, "Failed to update index ledger");
        }
    }
}
