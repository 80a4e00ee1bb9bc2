//! In-process vector index with exact cosine scoring.

use super::{rank_exact, VectorIndex, VectorMatch, VectorRecord};
use async_trait::async_trait;
use kbqa_core::AppResult;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records.read().get(id).cloned()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, record: VectorRecord) -> AppResult<()> {
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<VectorMatch>> {
        let records = self.records.read();
        Ok(rank_exact(vector, records.values(), top_k))
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.records.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::VectorMetadata;

    fn record(id: &str, values: Vec<f32>, question: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: VectorMetadata {
                id: id.to_string(),
                question: question.to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let index = MemoryIndex::new();
        index.upsert(record("a", vec![1.0, 0.0], "v1")).await.unwrap();
        index.upsert(record("a", vec![0.0, 1.0], "v2")).await.unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a").unwrap().metadata.question, "v2");
    }

    #[tokio::test]
    async fn test_query_returns_best_first() {
        let index = MemoryIndex::new();
        index.upsert(record("x", vec![0.0, 1.0], "x")).await.unwrap();
        index.upsert(record("y", vec![1.0, 0.1], "y")).await.unwrap();

        let matches = index.query(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "y");
        assert!(matches[0].score > matches[1].score);
        assert_eq!(matches[0].metadata.as_ref().unwrap().question, "y");
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let index = MemoryIndex::new();
        index.delete("missing").await.unwrap();
        index.upsert(record("a", vec![1.0], "a")).await.unwrap();
        index.delete("a").await.unwrap();
        assert!(index.is_empty());
    }
}
