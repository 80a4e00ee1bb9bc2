//! Operator-driven reconciliation of the vector index.
//!
//! Walks every Q&A pair (or only those whose last index attempt did not
//! finish cleanly) and re-runs the index leg, then retries pending
//! de-indexes. Never triggered automatically.

use crate::db::{IndexState, QaRepository};
use crate::indexing::IndexingCoordinator;
use crate::pagination::PageRequest;
use kbqa_core::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

const PAGE_SIZE: i64 = 100;

/// States that mean the last index attempt did not end in `indexed`.
const UNFINISHED: [IndexState; 3] = [
    IndexState::Indexing,
    IndexState::Reindexing,
    IndexState::IndexFailed,
];

/// Options for a reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReindexOptions {
    /// Count what would be processed without touching the index
    pub dry_run: bool,
    /// Stop after this many pairs
    pub limit: Option<usize>,
    /// Only pairs whose ledger state is unfinished or failed
    pub failed_only: bool,
}

/// Summary of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReindexReport {
    pub processed: usize,
    pub indexed: usize,
    pub failed: usize,
    pub deindexed: usize,
    pub duration_secs: f64,
}

pub struct Reconciler {
    repo: QaRepository,
    indexer: IndexingCoordinator,
}

impl Reconciler {
    pub fn new(repo: QaRepository, indexer: IndexingCoordinator) -> Self {
        Self { repo, indexer }
    }

    pub async fn run(&self, options: &ReindexOptions) -> AppResult<ReindexReport> {
        let start = Instant::now();
        let mut report = ReindexReport::default();

        tracing::info!(
            dry_run = options.dry_run,
            failed_only = options.failed_only,
            limit = ?options.limit,
            "Starting reindex"
        );

        let wanted: Option<HashSet<Uuid>> = if options.failed_only {
            Some(
                self.indexer
                    .ledger()
                    .in_states(&UNFINISHED)
                    .await?
                    .into_iter()
                    .map(|entry| entry.entity_id)
                    .collect(),
            )
        } else {
            None
        };

        let mut request = PageRequest::first(PAGE_SIZE);
        'pages: loop {
            let page = self.repo.list(&request).await?;

            for pair in &page.data {
                if options.limit.is_some_and(|limit| report.processed >= limit) {
                    break 'pages;
                }
                if wanted.as_ref().is_some_and(|ids| !ids.contains(&pair.id)) {
                    continue;
                }

                report.processed += 1;
                if options.dry_run {
                    continue;
                }

                match self.indexer.index(pair, true).await {
                    IndexState::Indexed => report.indexed += 1,
                    _ => report.failed += 1,
                }
            }

            match page.pagination.next_cursor {
                Some(cursor) if page.pagination.has_next => {
                    request = PageRequest::after(cursor, PAGE_SIZE);
                }
                _ => break,
            }
        }

        let pending = self
            .indexer
            .ledger()
            .in_states(&[IndexState::DeindexFailed, IndexState::Deindexing])
            .await?;
        for entry in pending {
            if options.dry_run {
                continue;
            }
            if self.indexer.deindex(entry.entity_id).await {
                report.deindexed += 1;
            } else {
                report.failed += 1;
            }
        }

        report.duration_secs = start.elapsed().as_secs_f64();
        tracing::info!(
            processed = report.processed,
            indexed = report.indexed,
            failed = report.failed,
            deindexed = report.deindexed,
            "Reindex finished in {:.2}s",
            report.duration_secs
        );
        Ok(report)
    }
}
