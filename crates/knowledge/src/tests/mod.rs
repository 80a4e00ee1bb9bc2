//! Cross-module scenario tests.

mod conversations;
mod pagination_properties;
mod scenario;
mod search;

use crate::embeddings::providers::mock::MockProvider;
use crate::indexing::Deadlines;
use crate::vector_index::{MemoryIndex, VectorIndex, VectorMatch, VectorRecord};
use crate::{Database, KnowledgeBase, QaInput, QaPair};
use async_trait::async_trait;
use kbqa_core::{AppError, AppResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const DIMS: usize = 64;

/// Vector index double whose calls fail or stall on demand.
#[derive(Debug, Default)]
pub(crate) struct FlakyIndex {
    pub inner: MemoryIndex,
    fail_upsert: AtomicBool,
    fail_delete: AtomicBool,
    fail_query: AtomicBool,
    delay_ms: AtomicU64,
}

impl FlakyIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upsert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::SeqCst);
    }

    pub fn stall_for(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn gate(&self, flag: &AtomicBool, op: &str) -> AppResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if flag.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable(format!("injected {} failure", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    fn backend_name(&self) -> &str {
        "flaky"
    }

    async fn upsert(&self, record: VectorRecord) -> AppResult<()> {
        self.gate(&self.fail_upsert, "upsert").await?;
        self.inner.upsert(record).await
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<VectorMatch>> {
        self.gate(&self.fail_query, "query").await?;
        self.inner.query(vector, top_k).await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.gate(&self.fail_delete, "delete").await?;
        self.inner.delete(id).await
    }
}

pub(crate) fn knowledge_base(index: Arc<FlakyIndex>) -> KnowledgeBase {
    KnowledgeBase::from_parts(
        Database::memory().unwrap(),
        Arc::new(MockProvider::new(DIMS)),
        index,
        Deadlines {
            embed: Duration::from_secs(5),
            index: Duration::from_millis(200),
        },
    )
}

/// Create `n` pairs, returning them oldest first.
pub(crate) async fn seed_pairs(kb: &KnowledgeBase, n: usize) -> Vec<QaPair> {
    let mut pairs = Vec::with_capacity(n);
    for i in 0..n {
        let outcome = kb
            .qa()
            .create(QaInput::new(
                format!("Question number {}", i),
                format!("Answer number {}", i),
            ))
            .await
            .unwrap();
        pairs.push(outcome.pair);
    }
    pairs
}
