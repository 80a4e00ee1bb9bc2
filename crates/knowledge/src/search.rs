//! Full-text and semantic search over Q&A pairs.
//!
//! The two modes are independent: neither falls back to the other and their
//! results are never merged here.

use crate::db::QaRepository;
use crate::embeddings::EmbeddingProvider;
use crate::indexing::{bounded, Deadlines};
use crate::pagination::clamp_limit;
use crate::types::{QaPair, ScoredResult, SearchResults};
use crate::vector_index::VectorIndex;
use kbqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Maximum full-text query length in characters.
pub const MAX_QUERY_CHARS: usize = 200;

/// Bounds for semantic `top_k`.
pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 20;
pub const DEFAULT_TOP_K: usize = 5;

/// A validated full-text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullTextQuery {
    match_expression: Option<String>,
}

impl FullTextQuery {
    /// Validate length and build an FTS5 expression.
    ///
    /// The query is split into words at every non-alphanumeric character, the
    /// same boundaries the FTS5 tokenizer uses, so `docker's` yields `docker`
    /// and `s`. Each word is quoted and the words are OR-combined. A query
    /// with no words left matches nothing.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let query = raw.trim();
        if query.is_empty() {
            return Err(AppError::Validation("search query is required".to_string()));
        }
        let len = query.chars().count();
        if len > MAX_QUERY_CHARS {
            return Err(AppError::Validation(format!(
                "search query must be at most {} characters (got {})",
                MAX_QUERY_CHARS, len
            )));
        }

        let terms: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(|word| format!("\"{}\"", word))
            .collect();

        Ok(Self {
            match_expression: (!terms.is_empty()).then(|| terms.join(" OR ")),
        })
    }

    pub fn match_expression(&self) -> Option<&str> {
        self.match_expression.as_deref()
    }
}

/// Semantic search input: exactly one of `query` or `embedding`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

impl SemanticRequest {
    pub fn text(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: Some(query.into()),
            embedding: None,
            top_k: Some(top_k),
        }
    }

    pub fn vector(embedding: Vec<f32>, top_k: usize) -> Self {
        Self {
            query: None,
            embedding: Some(embedding),
            top_k: Some(top_k),
        }
    }
}

/// Dispatches the two search modes.
#[derive(Clone)]
pub struct SearchEngine {
    repo: QaRepository,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    deadlines: Deadlines,
}

impl SearchEngine {
    pub fn new(
        repo: QaRepository,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        deadlines: Deadlines,
    ) -> Self {
        Self {
            repo,
            embedder,
            index,
            deadlines,
        }
    }

    /// Rows ranked by the relational engine. Scores are not reported.
    pub async fn full_text(&self, query: &str, limit: Option<i64>) -> AppResult<SearchResults<QaPair>> {
        let parsed = FullTextQuery::parse(query)?;
        let pairs = self.ranked(&parsed, clamp_limit(limit)).await?;
        Ok(SearchResults::new(
            pairs
                .into_iter()
                .map(|entity| ScoredResult {
                    entity,
                    score: None,
                })
                .collect(),
        ))
    }

    /// Up to `limit` ranked rows for an already validated query.
    pub(crate) async fn ranked(&self, query: &FullTextQuery, limit: usize) -> AppResult<Vec<QaPair>> {
        match query.match_expression() {
            Some(expression) => {
                let pairs = self
                    .repo
                    .search_full_text(expression.to_string(), limit)
                    .await?;
                tracing::debug!(expression, hits = pairs.len(), "Full-text search");
                Ok(pairs)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Nearest pairs by vector similarity, re-read from the relational store.
    ///
    /// Index hits whose id does not parse or no longer exists are dropped.
    pub async fn semantic(&self, request: SemanticRequest) -> AppResult<SearchResults<QaPair>> {
        let top_k = request.top_k.unwrap_or(DEFAULT_TOP_K);
        if !(MIN_TOP_K..=MAX_TOP_K).contains(&top_k) {
            return Err(AppError::Validation(format!(
                "top_k must be between {} and {} (got {})",
                MIN_TOP_K, MAX_TOP_K, top_k
            )));
        }

        let vector = match (request.query, request.embedding) {
            (Some(query), None) => {
                if query.trim().is_empty() {
                    return Err(AppError::Validation("query must not be empty".to_string()));
                }
                bounded("embedding", self.deadlines.embed, self.embedder.embed(&query)).await?
            }
            (None, Some(embedding)) => {
                if embedding.len() != self.embedder.dimensions() {
                    return Err(AppError::Validation(format!(
                        "embedding must have {} dimensions (got {})",
                        self.embedder.dimensions(),
                        embedding.len()
                    )));
                }
                embedding
            }
            _ => {
                return Err(AppError::Validation(
                    "provide exactly one of query or embedding".to_string(),
                ))
            }
        };

        let matches = bounded(
            "vector query",
            self.deadlines.index,
            self.index.query(&vector, top_k),
        )
        .await?;

        let mut seen = HashSet::new();
        let mut ranked: Vec<(Uuid, f32)> = Vec::with_capacity(matches.len());
        for hit in matches {
            match Uuid::parse_str(&hit.id) {
                Ok(id) if seen.insert(id) => ranked.push((id, hit.score)),
                Ok(_) => {}
                Err(_) => tracing::debug!(id = %hit.id, "Dropping vector hit with malformed id"),
            }
        }

        let ids: Vec<Uuid> = ranked.iter().map(|(id, _)| *id).collect();
        let mut rows: HashMap<Uuid, QaPair> = self
            .repo
            .find_many(&ids)
            .await?
            .into_iter()
            .map(|pair| (pair.id, pair))
            .collect();

        let results: Vec<ScoredResult<QaPair>> = ranked
            .into_iter()
            .filter_map(|(id, score)| {
                let entity = rows.remove(&id);
                if entity.is_none() {
                    tracing::debug!(id = %id, "Dropping vector hit for missing Q&A pair");
                }
                entity.map(|entity| ScoredResult {
                    entity,
                    score: Some(score),
                })
            })
            .collect();

        tracing::debug!(
            top_k,
            returned = results.len(),
            backend = self.index.backend_name(),
            "Semantic search"
        );
        Ok(SearchResults::new(results))
    }
}
