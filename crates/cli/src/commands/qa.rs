//! Q&A command handler.
//!
//! Create, read, update, delete, list and search question/answer pairs, and
//! reconcile the vector index.

use super::{parse_id, PageArgs};
use crate::output::{print_json, print_page, print_pair};
use clap::{Args, Subcommand};
use kbqa_core::AppResult;
use kbqa_knowledge::{
    IndexState, KnowledgeBase, QaInput, QaListRequest, QaPair, ReindexOptions, SearchResults,
    SemanticRequest,
};

/// Manage and search Q&A pairs
#[derive(Args, Debug)]
pub struct QaCommand {
    #[command(subcommand)]
    pub action: QaAction,
}

#[derive(Subcommand, Debug)]
pub enum QaAction {
    /// List pairs newest first, or ranked by a keyword search
    List(QaListCommand),
    /// Show one pair
    Get(QaGetCommand),
    /// Show several pairs by id (1-50)
    GetMany(QaGetManyCommand),
    /// Add a pair and index it
    Create(QaCreateCommand),
    /// Replace a pair's question and answer
    Update(QaUpdateCommand),
    /// Delete a pair from the store and the vector index
    Delete(QaGetCommand),
    /// Keyword search ranked by relevance
    Search(QaSearchCommand),
    /// Semantic search by text or by a precomputed embedding
    Similar(QaSimilarCommand),
    /// Count stored pairs
    Count,
    /// Re-run the vector index leg across the corpus
    Reindex(QaReindexCommand),
}

#[derive(Args, Debug)]
pub struct QaListCommand {
    #[command(flatten)]
    pub page: PageArgs,

    /// Rank by keyword relevance instead of recency
    #[arg(short, long)]
    pub search: Option<String>,
}

#[derive(Args, Debug)]
pub struct QaGetCommand {
    /// Pair id
    pub id: String,
}

#[derive(Args, Debug)]
pub struct QaGetManyCommand {
    /// Pair ids
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct QaCreateCommand {
    /// Question text (1-1000 characters)
    #[arg(short, long)]
    pub question: String,

    /// Answer text (1-5000 characters)
    #[arg(short, long)]
    pub answer: String,
}

#[derive(Args, Debug)]
pub struct QaUpdateCommand {
    /// Pair id
    pub id: String,

    /// New question text
    #[arg(short, long)]
    pub question: String,

    /// New answer text
    #[arg(short, long)]
    pub answer: String,
}

#[derive(Args, Debug)]
pub struct QaSearchCommand {
    /// Keywords (1-200 characters)
    pub query: String,

    /// Maximum results (1-100, default 10)
    #[arg(short, long)]
    pub limit: Option<i64>,
}

#[derive(Args, Debug)]
pub struct QaSimilarCommand {
    /// Text to embed and search for
    pub query: Option<String>,

    /// Precomputed embedding as comma-separated floats
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, conflicts_with = "query")]
    pub embedding: Option<Vec<f32>>,

    /// Number of neighbours (1-20)
    #[arg(short = 'k', long, default_value = "5")]
    pub top_k: usize,
}

#[derive(Args, Debug)]
pub struct QaReindexCommand {
    /// Report what would be reindexed without touching the index
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after this many pairs
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only pairs whose last index attempt did not succeed
    #[arg(long)]
    pub failed_only: bool,
}

impl QaCommand {
    pub async fn execute(&self, kb: &KnowledgeBase, json: bool) -> AppResult<()> {
        match &self.action {
            QaAction::List(cmd) => cmd.execute(kb, json).await,
            QaAction::Get(cmd) => {
                let pair = kb.qa().get(parse_id(&cmd.id)?).await?;
                if json {
                    print_json(&pair)
                } else {
                    print_pair(&pair);
                    Ok(())
                }
            }
            QaAction::GetMany(cmd) => cmd.execute(kb, json).await,
            QaAction::Create(cmd) => {
                let outcome = kb
                    .qa()
                    .create(QaInput::new(cmd.question.clone(), cmd.answer.clone()))
                    .await?;
                if json {
                    return print_json(&outcome);
                }
                println!("Created {}", outcome.pair.id);
                report_index_state(outcome.index_state);
                Ok(())
            }
            QaAction::Update(cmd) => {
                let outcome = kb
                    .qa()
                    .update(
                        parse_id(&cmd.id)?,
                        QaInput::new(cmd.question.clone(), cmd.answer.clone()),
                    )
                    .await?;
                if json {
                    return print_json(&outcome);
                }
                println!("Updated {}", outcome.pair.id);
                report_index_state(outcome.index_state);
                Ok(())
            }
            QaAction::Delete(cmd) => {
                let id = parse_id(&cmd.id)?;
                let outcome = kb.qa().delete(id).await?;
                if json {
                    return print_json(&outcome);
                }
                println!("Deleted {}", id);
                if !outcome.deleted_from_index {
                    println!("Warning: vector index entry was not removed; run `kbqa qa reindex` later");
                }
                Ok(())
            }
            QaAction::Search(cmd) => {
                let results = kb.search().full_text(&cmd.query, cmd.limit).await?;
                print_results(&results, json)
            }
            QaAction::Similar(cmd) => {
                let request = SemanticRequest {
                    query: cmd.query.clone(),
                    embedding: cmd.embedding.clone(),
                    top_k: Some(cmd.top_k),
                };
                let results = kb.search().semantic(request).await?;
                print_results(&results, json)
            }
            QaAction::Count => {
                let count = kb.qa().count().await?;
                if json {
                    print_json(&serde_json::json!({ "count": count }))
                } else {
                    println!("{}", count);
                    Ok(())
                }
            }
            QaAction::Reindex(cmd) => cmd.execute(kb, json).await,
        }
    }
}

impl QaListCommand {
    pub async fn execute(&self, kb: &KnowledgeBase, json: bool) -> AppResult<()> {
        tracing::debug!("List options: {:?}", self);

        let request = QaListRequest {
            page: self.page.request(),
            search: self.search.clone(),
        };
        let page = kb.qa().list(&request).await?;
        print_page(&page, json, print_pair)
    }
}

impl QaGetManyCommand {
    pub async fn execute(&self, kb: &KnowledgeBase, json: bool) -> AppResult<()> {
        let ids = self
            .ids
            .iter()
            .map(|raw| parse_id(raw))
            .collect::<AppResult<Vec<_>>>()?;
        let pairs = kb.qa().get_many(&ids).await?;

        if json {
            return print_json(&serde_json::json!({ "data": pairs, "count": pairs.len() }));
        }
        if pairs.is_empty() {
            println!("(no results)");
        }
        pairs.iter().for_each(print_pair);
        Ok(())
    }
}

impl QaReindexCommand {
    pub async fn execute(&self, kb: &KnowledgeBase, json: bool) -> AppResult<()> {
        let options = ReindexOptions {
            dry_run: self.dry_run,
            limit: self.limit,
            failed_only: self.failed_only,
        };
        let report = kb.reindex(&options).await?;

        if json {
            return print_json(&report);
        }
        if self.dry_run {
            println!("Would reindex {} pairs", report.processed);
        } else {
            println!(
                "Reindexed {} of {} pairs ({} failed, {} stale vectors removed) in {:.2}s",
                report.indexed,
                report.processed,
                report.failed,
                report.deindexed,
                report.duration_secs
            );
        }
        Ok(())
    }
}

fn report_index_state(state: IndexState) {
    if state != IndexState::Indexed {
        println!(
            "Warning: stored, but vector indexing ended in state '{}'; run `kbqa qa reindex --failed-only` later",
            state
        );
    }
}

fn print_results(results: &SearchResults<QaPair>, json: bool) -> AppResult<()> {
    if json {
        return print_json(results);
    }
    if results.results.is_empty() {
        println!("(no results)");
    }
    for hit in &results.results {
        if let Some(score) = hit.score {
            println!("[{:.4}]", score);
        }
        print_pair(&hit.entity);
    }
    Ok(())
}
