//! Vector index abstraction.
//!
//! The vector index is a derived projection of the relational store: one
//! record per Q&A pair id, holding the embedding and a metadata snapshot.
//! Upsert and delete are idempotent.

pub mod memory;
pub mod pinecone;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use pinecone::PineconeIndex;
pub use sqlite::SqliteIndex;

use crate::db::format_ts;
use crate::types::QaPair;
use async_trait::async_trait;
use kbqa_core::config::{AppConfig, VectorIndexSettings};
use kbqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Denormalized snapshot stored next to each vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorMetadata {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&QaPair> for VectorMetadata {
    fn from(pair: &QaPair) -> Self {
        Self {
            id: pair.id.to_string(),
            question: pair.question.clone(),
            answer: pair.answer.clone(),
            created_at: format_ts(&pair.created_at),
            updated_at: format_ts(&pair.updated_at),
        }
    }
}

/// A vector keyed by entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<VectorMetadata>,
}

/// Trait for vector index backends.
#[async_trait]
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    /// Backend name (e.g., "memory", "sqlite", "pinecone")
    fn backend_name(&self) -> &str;

    /// Insert or replace the record with `record.id`.
    async fn upsert(&self, record: VectorRecord) -> AppResult<()>;

    /// The `top_k` most similar records, highest score first.
    async fn query(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<VectorMatch>>;

    /// Remove a record. Removing an absent id succeeds.
    async fn delete(&self, id: &str) -> AppResult<()>;
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Exact top-k over an iterator of candidates: score descending, id
/// ascending on ties.
pub(crate) fn rank_exact<'a, I>(query: &[f32], candidates: I, top_k: usize) -> Vec<VectorMatch>
where
    I: IntoIterator<Item = &'a VectorRecord>,
{
    let mut matches: Vec<VectorMatch> = candidates
        .into_iter()
        .map(|record| VectorMatch {
            id: record.id.clone(),
            score: cosine_similarity(query, &record.values),
            metadata: Some(record.metadata.clone()),
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    matches.truncate(top_k);
    matches
}

/// Create the configured vector index backend.
pub fn create_index(config: &AppConfig) -> AppResult<Arc<dyn VectorIndex>> {
    let settings: &VectorIndexSettings = &config.vector_index;
    match settings.provider.as_str() {
        "memory" => Ok(Arc::new(MemoryIndex::new())),

        "sqlite" => {
            let path = config.resolve_path(&settings.path);
            Ok(Arc::new(SqliteIndex::open(&path)?))
        }

        "pinecone" => {
            let api_key = AppConfig::resolve_api_key(settings.api_key_env.as_deref())?
                .ok_or_else(|| {
                    AppError::Config("vector_index.api_key_env is required for pinecone".to_string())
                })?;
            Ok(Arc::new(PineconeIndex::new(settings, api_key)?))
        }

        _ => Err(AppError::Config(format!(
            "Unknown vector index provider: '{}'. Supported providers: memory, sqlite, pinecone",
            settings.provider
        ))),
    }
}
