//! Full-text and semantic search through the assembled knowledge base.

use super::{knowledge_base, seed_pairs, FlakyIndex, DIMS};
use crate::embeddings::providers::mock::MockProvider;
use crate::embeddings::EmbeddingProvider;
use crate::pagination::PageRequest;
use crate::vector_index::{VectorIndex, VectorMetadata, VectorRecord};
use crate::{compose_embedding_text, KnowledgeBase, QaInput, QaListRequest, QaPair, SemanticRequest};
use uuid::Uuid;

async fn corpus(kb: &KnowledgeBase) -> (QaPair, QaPair) {
    let docker = kb
        .qa()
        .create(QaInput::new("What is Docker?", "A containerization platform"))
        .await
        .unwrap()
        .pair;
    let rust = kb
        .qa()
        .create(QaInput::new(
            "What is Rust?",
            "A systems programming language focused on safety",
        ))
        .await
        .unwrap()
        .pair;
    (docker, rust)
}

async fn vector_of(pair: &QaPair) -> Vec<f32> {
    MockProvider::new(DIMS)
        .embed(&compose_embedding_text(&pair.question, &pair.answer))
        .await
        .unwrap()
}

#[tokio::test]
async fn full_text_finds_keyword_without_scores() {
    let kb = knowledge_base(FlakyIndex::new());
    let (docker, _) = corpus(&kb).await;

    let results = kb.search().full_text("docker", None).await.unwrap();
    assert_eq!(results.count, 1);
    assert_eq!(results.results[0].entity.id, docker.id);
    assert_eq!(results.results[0].score, None);

    let none = kb.search().full_text("kubernetes", None).await.unwrap();
    assert_eq!(none.count, 0);
    assert!(none.results.is_empty());
}

#[tokio::test]
async fn full_text_matches_words_joined_by_punctuation() {
    let kb = knowledge_base(FlakyIndex::new());
    let (docker, _) = corpus(&kb).await;

    let results = kb.search().full_text("docker's", None).await.unwrap();
    assert_eq!(results.count, 1);
    assert_eq!(results.results[0].entity.id, docker.id);

    let results = kb.search().full_text("what-is", None).await.unwrap();
    assert_eq!(results.count, 2);
}

#[tokio::test]
async fn full_text_rejects_blank_and_long_queries() {
    let kb = knowledge_base(FlakyIndex::new());
    assert!(kb.search().full_text("   ", None).await.unwrap_err().is_validation());
    assert!(kb
        .search()
        .full_text(&"x".repeat(201), None)
        .await
        .unwrap_err()
        .is_validation());

    // Only quote characters: valid but matches nothing
    let results = kb.search().full_text("\"\"", None).await.unwrap();
    assert_eq!(results.count, 0);
}

#[tokio::test]
async fn list_with_search_carries_no_cursors() {
    let kb = knowledge_base(FlakyIndex::new());
    seed_pairs(&kb, 5).await;

    let page = kb
        .qa()
        .list(&QaListRequest {
            page: PageRequest::first(2),
            search: Some("question".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert!(page.pagination.has_next);
    assert_eq!(page.pagination.next_cursor, None);
    assert_eq!(page.pagination.prev_cursor, None);

    // A blank search falls back to the plain listing
    let plain = kb
        .qa()
        .list(&QaListRequest {
            page: PageRequest::first(2),
            search: Some("  ".to_string()),
        })
        .await
        .unwrap();
    assert!(plain.pagination.next_cursor.is_some());
}

#[tokio::test]
async fn semantic_by_embedding_ranks_exact_match_first() {
    let kb = knowledge_base(FlakyIndex::new());
    let (docker, rust) = corpus(&kb).await;

    let results = kb
        .search()
        .semantic(SemanticRequest::vector(vector_of(&rust).await, 2))
        .await
        .unwrap();
    assert_eq!(results.count, 2);
    assert_eq!(results.results[0].entity, rust);
    assert_eq!(results.results[1].entity.id, docker.id);

    let top = results.results[0].score.unwrap();
    assert!((top - 1.0).abs() < 1e-5);
    assert!(results.results[1].score.unwrap() < top);
}

#[tokio::test]
async fn semantic_by_text_returns_scored_pairs() {
    let kb = knowledge_base(FlakyIndex::new());
    corpus(&kb).await;

    let results = kb
        .search()
        .semantic(SemanticRequest::text("docker containerization", 1))
        .await
        .unwrap();
    assert_eq!(results.count, 1);
    assert!(results.results[0].score.is_some());
}

#[tokio::test]
async fn semantic_omits_deleted_and_malformed_hits() {
    let index = FlakyIndex::new();
    let kb = knowledge_base(index.clone());
    let (docker, rust) = corpus(&kb).await;
    let target = vector_of(&docker).await;

    // Vector left behind by a delete whose index leg failed
    index.fail_deletes(true);
    let outcome = kb.qa().delete(rust.id).await.unwrap();
    assert!(!outcome.deleted_from_index);
    index.fail_deletes(false);

    for id in [Uuid::now_v7().to_string(), "not-a-uuid".to_string()] {
        index
            .inner
            .upsert(VectorRecord {
                id: id.clone(),
                values: target.clone(),
                metadata: VectorMetadata {
                    id,
                    ..Default::default()
                },
            })
            .await
            .unwrap();
    }
    assert_eq!(index.inner.len(), 4);

    let results = kb
        .search()
        .semantic(SemanticRequest::vector(target, 10))
        .await
        .unwrap();
    assert_eq!(results.count, 1);
    assert_eq!(results.results[0].entity, docker);
}

#[tokio::test]
async fn semantic_validates_request_shape() {
    let kb = knowledge_base(FlakyIndex::new());
    let search = kb.search();

    for top_k in [0, 21] {
        let err = search
            .semantic(SemanticRequest::text("docker", top_k))
            .await
            .unwrap_err();
        assert!(err.is_validation(), "top_k {} accepted", top_k);
    }
    assert!(search
        .semantic(SemanticRequest::text("docker", 20))
        .await
        .is_ok());

    let both = SemanticRequest {
        query: Some("docker".to_string()),
        embedding: Some(vec![0.0; DIMS]),
        top_k: None,
    };
    assert!(search.semantic(both).await.unwrap_err().is_validation());
    assert!(search
        .semantic(SemanticRequest::default())
        .await
        .unwrap_err()
        .is_validation());
    assert!(search
        .semantic(SemanticRequest::vector(vec![0.1; DIMS - 1], 5))
        .await
        .unwrap_err()
        .is_validation());
    assert!(search
        .semantic(SemanticRequest::text("  ", 5))
        .await
        .unwrap_err()
        .is_validation());
}

#[tokio::test]
async fn semantic_surfaces_index_outage() {
    let index = FlakyIndex::new();
    let kb = knowledge_base(index.clone());
    corpus(&kb).await;

    index.fail_queries(true);
    let err = kb
        .search()
        .semantic(SemanticRequest::text("docker", 3))
        .await
        .unwrap_err();
    assert!(err.is_upstream());

    // Full-text search does not depend on the index
    assert_eq!(kb.search().full_text("docker", None).await.unwrap().count, 1);
}
