//! Knowledge base for question/answer pairs and conversation transcripts.
//!
//! The relational store (SQLite) is the source of truth. Q&A writes are
//! mirrored into a vector index on a best-effort basis, and both stores can
//! be searched independently.

pub mod conversation;
pub mod db;
pub mod embeddings;
pub mod indexing;
pub mod pagination;
pub mod qa;
pub mod reconcile;
pub mod search;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use conversation::{ConversationDeleted, ConversationService};
pub use db::{Database, IndexState};
pub use indexing::{compose_embedding_text, Deadlines, IndexingCoordinator};
pub use pagination::{CursorPagination, Direction, Page, PageRequest};
pub use qa::{QaListRequest, QaService, QaWriteOutcome};
pub use reconcile::{ReindexOptions, ReindexReport};
pub use search::{SearchEngine, SemanticRequest};
pub use types::{
    Conversation, DeleteOutcome, Message, NewMessage, QaInput, QaPair, RawMessage, Role,
    ScoredResult, SearchResults,
};

use db::{ConversationRepository, IndexLedger, QaRepository};
use embeddings::EmbeddingProvider;
use kbqa_core::{AppConfig, AppResult};
use reconcile::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use vector_index::VectorIndex;

/// Explicitly constructed service graph over one relational store, one
/// embedding provider and one vector index.
#[derive(Clone)]
pub struct KnowledgeBase {
    db: Database,
    qa: QaService,
    conversations: ConversationService,
}

impl KnowledgeBase {
    /// Build every collaborator from configuration.
    pub fn open(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let db = Database::open(&config.resolved_database())?;
        let embedder = embeddings::create_provider(&config.embedding)?;
        let index = vector_index::create_index(config)?;
        let deadlines = Deadlines {
            embed: Duration::from_secs(config.embedding.timeout_secs),
            index: Duration::from_secs(config.vector_index.timeout_secs),
        };

        tracing::debug!(
            embedding = embedder.provider_name(),
            model = embedder.model_name(),
            vector_index = index.backend_name(),
            "Knowledge base ready"
        );

        Ok(Self::from_parts(db, embedder, index, deadlines))
    }

    /// Wire services over already constructed collaborators.
    pub fn from_parts(
        db: Database,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        deadlines: Deadlines,
    ) -> Self {
        let qa_repo = QaRepository::new(db.clone());
        let indexer = IndexingCoordinator::new(
            embedder.clone(),
            index.clone(),
            IndexLedger::new(db.clone()),
            deadlines,
        );
        let search = SearchEngine::new(qa_repo.clone(), embedder, index, deadlines);

        Self {
            qa: QaService::new(qa_repo, indexer, search),
            conversations: ConversationService::new(ConversationRepository::new(db.clone())),
            db,
        }
    }

    pub fn qa(&self) -> &QaService {
        &self.qa
    }

    pub fn search(&self) -> &SearchEngine {
        self.qa.search()
    }

    pub fn conversations(&self) -> &ConversationService {
        &self.conversations
    }

    pub fn ledger(&self) -> &IndexLedger {
        self.qa.indexer().ledger()
    }

    /// Re-run the index leg across the corpus.
    pub async fn reindex(&self, options: &ReindexOptions) -> AppResult<ReindexReport> {
        Reconciler::new(QaRepository::new(self.db.clone()), self.qa.indexer().clone())
            .run(options)
            .await
    }
}
