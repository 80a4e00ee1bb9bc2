//! End-to-end walk through a single Q&A pair's lifecycle.

use super::{knowledge_base, FlakyIndex};
use crate::pagination::PageRequest;
use crate::{IndexState, QaInput, QaListRequest, SemanticRequest};

#[tokio::test]
async fn docker_pair_lifecycle() {
    let index = FlakyIndex::new();
    let kb = knowledge_base(index.clone());

    let created = kb
        .qa()
        .create(QaInput::new("What is Docker?", "A containerization platform"))
        .await
        .unwrap();
    assert_eq!(created.index_state, IndexState::Indexed);
    let x = created.pair.id;
    let t = created.pair.created_at;
    assert_eq!(created.pair.updated_at, t);
    assert_eq!(kb.qa().count().await.unwrap(), 1);

    let page = kb
        .qa()
        .list(&QaListRequest {
            page: PageRequest::first(1),
            search: None,
        })
        .await
        .unwrap();
    assert_eq!(page.ids(), vec![x]);
    assert!(!page.pagination.has_next);
    assert_eq!(page.pagination.next_cursor, Some(x.to_string()));

    let updated = kb
        .qa()
        .update(x, QaInput::new("What is Docker?", "An open-source container runtime"))
        .await
        .unwrap();
    assert_eq!(updated.pair.id, x);
    assert_eq!(updated.pair.question, "What is Docker?");
    assert_eq!(updated.pair.answer, "An open-source container runtime");
    assert!(updated.pair.updated_at > t);
    assert_eq!(updated.pair.created_at, t);

    let hits = kb
        .search()
        .semantic(SemanticRequest::text("container runtime", 5))
        .await
        .unwrap();
    assert_eq!(hits.count, 1);
    assert_eq!(hits.results[0].entity, updated.pair);

    let fetched = kb.qa().get_many(&[x]).await.unwrap();
    assert_eq!(fetched, vec![updated.pair.clone()]);

    let deleted = kb.qa().delete(x).await.unwrap();
    assert!(deleted.success && deleted.deleted_from_relational && deleted.deleted_from_index);
    assert!(kb.qa().get(x).await.unwrap_err().is_not_found());
    assert!(index.inner.is_empty());
    assert_eq!(kb.qa().count().await.unwrap(), 0);
}

#[tokio::test]
async fn get_many_bounds_and_missing_ids() {
    let kb = knowledge_base(FlakyIndex::new());
    let a = kb.qa().create(QaInput::new("q1", "a1")).await.unwrap().pair;
    let b = kb.qa().create(QaInput::new("q2", "a2")).await.unwrap().pair;

    let found = kb
        .qa()
        .get_many(&[a.id, uuid::Uuid::now_v7(), b.id])
        .await
        .unwrap();
    assert_eq!(found, vec![b, a]);

    assert!(kb.qa().get_many(&[]).await.unwrap_err().is_validation());
    let too_many: Vec<_> = (0..51).map(|_| uuid::Uuid::now_v7()).collect();
    assert!(kb.qa().get_many(&too_many).await.unwrap_err().is_validation());
}
