//! Q&A operations: relational writes with write-through indexing, listings
//! and lookups.

use crate::db::{IndexState, QaRepository};
use crate::indexing::IndexingCoordinator;
use crate::pagination::{CursorPagination, Page, PageRequest};
use crate::search::{FullTextQuery, SearchEngine};
use crate::types::{DeleteOutcome, QaInput, QaPair, MAX_BATCH_IDS};
use kbqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Listing parameters; a non-empty `search` switches to ranked results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaListRequest {
    #[serde(flatten)]
    pub page: PageRequest,
    #[serde(default)]
    pub search: Option<String>,
}

/// A stored pair plus the outcome of its index leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaWriteOutcome {
    #[serde(flatten)]
    pub pair: QaPair,
    pub index_state: IndexState,
}

#[derive(Clone)]
pub struct QaService {
    repo: QaRepository,
    indexer: IndexingCoordinator,
    search: SearchEngine,
}

impl QaService {
    pub fn new(repo: QaRepository, indexer: IndexingCoordinator, search: SearchEngine) -> Self {
        Self {
            repo,
            indexer,
            search,
        }
    }

    /// Store a new pair, then index it.
    ///
    /// Relational failures are returned; index failures only show up in
    /// `index_state`.
    pub async fn create(&self, input: QaInput) -> AppResult<QaWriteOutcome> {
        let pair = self.repo.create(input).await?;
        tracing::info!(id = %pair.id, "Created Q&A pair");

        let index_state = self.indexer.index(&pair, false).await;
        Ok(QaWriteOutcome { pair, index_state })
    }

    pub async fn update(&self, id: Uuid, input: QaInput) -> AppResult<QaWriteOutcome> {
        let pair = self.repo.update(id, input).await?;
        tracing::info!(id = %pair.id, "Updated Q&A pair");

        let index_state = self.indexer.index(&pair, true).await;
        Ok(QaWriteOutcome { pair, index_state })
    }

    /// Delete from the relational store, then from the vector index.
    ///
    /// `NotFound` when no row exists; the index is left alone in that case.
    pub async fn delete(&self, id: Uuid) -> AppResult<DeleteOutcome> {
        if !self.repo.delete(id).await? {
            return Err(AppError::NotFound(format!("Q&A pair {} not found", id)));
        }
        tracing::info!(id = %id, "Deleted Q&A pair");

        let deleted_from_index = self.indexer.deindex(id).await;
        Ok(DeleteOutcome {
            success: true,
            deleted_from_relational: true,
            deleted_from_index,
        })
    }

    pub async fn get(&self, id: Uuid) -> AppResult<QaPair> {
        self.repo.get(id).await
    }

    /// Up to 50 pairs by id, newest first; unknown ids are skipped.
    pub async fn get_many(&self, ids: &[Uuid]) -> AppResult<Vec<QaPair>> {
        if ids.is_empty() || ids.len() > MAX_BATCH_IDS {
            return Err(AppError::Validation(format!(
                "ids must contain between 1 and {} entries (got {})",
                MAX_BATCH_IDS,
                ids.len()
            )));
        }
        self.repo.find_many(ids).await
    }

    pub async fn count(&self) -> AppResult<u64> {
        self.repo.count().await
    }

    /// Keyset listing, or ranked full-text results when `search` is set.
    ///
    /// Ranked pages re-rank the whole corpus on every call, so they carry no
    /// cursors: `has_next` says whether more matches exist and a supplied
    /// cursor is validated but does not offset the results.
    pub async fn list(&self, request: &QaListRequest) -> AppResult<Page<QaPair>> {
        let search = request
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let Some(search) = search else {
            return self.repo.list(&request.page).await;
        };

        let page = request.page.resolve()?;
        let query = FullTextQuery::parse(search)?;
        let mut data = self.search.ranked(&query, page.limit + 1).await?;
        let has_next = data.len() > page.limit;
        data.truncate(page.limit);

        Ok(Page {
            data,
            pagination: CursorPagination {
                next_cursor: None,
                prev_cursor: None,
                has_next,
                has_prev: page.cursor.is_some(),
            },
        })
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    pub fn indexer(&self) -> &IndexingCoordinator {
        &self.indexer
    }
}
