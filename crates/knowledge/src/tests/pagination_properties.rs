//! Cursor pagination properties across all three listings.

use super::{knowledge_base, seed_pairs, FlakyIndex};
use crate::pagination::{Direction, PageRequest};
use crate::{NewMessage, QaListRequest, Role};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

fn list(request: PageRequest) -> QaListRequest {
    QaListRequest {
        page: request,
        search: None,
    }
}

#[tokio::test]
async fn first_page_is_full_and_next_page_is_disjoint() {
    let kb = knowledge_base(FlakyIndex::new());
    let pairs = seed_pairs(&kb, 25).await;

    for limit in [1i64, 3, 7, 10, 24] {
        let first = kb.qa().list(&list(PageRequest::first(limit))).await.unwrap();
        assert_eq!(first.data.len(), limit as usize);
        assert!(first.pagination.has_next);
        assert!(!first.pagination.has_prev);

        let second = kb
            .qa()
            .list(&list(PageRequest::after(
                first.pagination.next_cursor.clone().unwrap(),
                limit,
            )))
            .await
            .unwrap();
        assert_eq!(second.data.len(), (limit as usize).min(pairs.len() - limit as usize));

        let a: HashSet<Uuid> = first.ids().into_iter().collect();
        let b: HashSet<Uuid> = second.ids().into_iter().collect();
        assert!(a.is_disjoint(&b), "limit {} pages overlap", limit);
    }
}

#[tokio::test]
async fn walking_forward_visits_every_row_once_newest_first() {
    let kb = knowledge_base(FlakyIndex::new());
    let pairs = seed_pairs(&kb, 23).await;

    let mut seen = Vec::new();
    let mut request = PageRequest::first(5);
    loop {
        let page = kb.qa().list(&list(request.clone())).await.unwrap();
        seen.extend(page.ids());
        if !page.pagination.has_next {
            break;
        }
        request = PageRequest::after(page.pagination.next_cursor.unwrap(), 5);
    }

    let expected: Vec<Uuid> = pairs.iter().rev().map(|p| p.id).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn prev_from_second_page_returns_first_page() {
    let kb = knowledge_base(FlakyIndex::new());
    seed_pairs(&kb, 12).await;

    let first = kb.qa().list(&list(PageRequest::first(4))).await.unwrap();
    let second = kb
        .qa()
        .list(&list(PageRequest::after(
            first.pagination.next_cursor.clone().unwrap(),
            4,
        )))
        .await
        .unwrap();
    let back = kb
        .qa()
        .list(&list(PageRequest::before(
            second.pagination.prev_cursor.clone().unwrap(),
            4,
        )))
        .await
        .unwrap();

    assert_eq!(back.ids(), first.ids());
    assert!(back.pagination.has_prev);
    // Nothing newer than the first page's first row
    assert!(!back.pagination.has_next);
}

#[tokio::test]
async fn cursor_page_has_prev_even_when_empty() {
    let kb = knowledge_base(FlakyIndex::new());
    let pairs = seed_pairs(&kb, 3).await;

    // The oldest row has nothing after it in newest-first order
    let page = kb
        .qa()
        .list(&list(PageRequest::after(pairs[0].id.to_string(), 10)))
        .await
        .unwrap();
    assert!(page.data.is_empty());
    assert!(page.pagination.has_prev);
    assert!(!page.pagination.has_next);
    assert_eq!(page.pagination.next_cursor, None);
}

#[tokio::test]
async fn empty_corpus_gives_empty_first_page() {
    let kb = knowledge_base(FlakyIndex::new());
    let page = kb.qa().list(&QaListRequest::default()).await.unwrap();
    assert!(page.data.is_empty());
    assert!(!page.pagination.has_next);
    assert!(!page.pagination.has_prev);

    let conversations = kb.conversations().list(&PageRequest::default()).await.unwrap();
    assert!(conversations.data.is_empty());
}

#[tokio::test]
async fn malformed_cursor_is_rejected_everywhere() {
    let kb = knowledge_base(FlakyIndex::new());
    let bad = PageRequest::after("definitely-not-an-id", 10);

    assert!(kb.qa().list(&list(bad.clone())).await.unwrap_err().is_validation());
    assert!(kb.conversations().list(&bad).await.unwrap_err().is_validation());
    assert!(kb
        .conversations()
        .messages(Uuid::now_v7(), &bad)
        .await
        .unwrap_err()
        .is_validation());
}

#[tokio::test]
async fn prev_without_cursor_is_a_first_page() {
    let kb = knowledge_base(FlakyIndex::new());
    seed_pairs(&kb, 4).await;

    let first = kb.qa().list(&list(PageRequest::first(2))).await.unwrap();
    let prev = kb
        .qa()
        .list(&list(PageRequest {
            limit: Some(2),
            cursor: None,
            direction: Direction::Prev,
        }))
        .await
        .unwrap();
    assert_eq!(prev, first);
}

#[tokio::test]
async fn conversations_page_newest_first() {
    let kb = knowledge_base(FlakyIndex::new());
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            kb.conversations()
                .create(Some(format!("chat {}", i)))
                .await
                .unwrap()
                .id,
        );
    }

    let first = kb.conversations().list(&PageRequest::first(2)).await.unwrap();
    assert_eq!(first.ids(), vec![ids[4], ids[3]]);

    let second = kb
        .conversations()
        .list(&PageRequest::after(first.pagination.next_cursor.clone().unwrap(), 2))
        .await
        .unwrap();
    assert_eq!(second.ids(), vec![ids[2], ids[1]]);

    let back = kb
        .conversations()
        .list(&PageRequest::before(second.pagination.prev_cursor.clone().unwrap(), 2))
        .await
        .unwrap();
    assert_eq!(back.ids(), first.ids());
}

#[tokio::test]
async fn messages_round_trip_in_chronological_order() {
    let kb = knowledge_base(FlakyIndex::new());
    let conversation = kb.conversations().create(None).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..7 {
        let message = kb
            .conversations()
            .add_message(NewMessage {
                conversation_id: conversation.id,
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                content: Some(format!("message {}", i)),
                tool_call_id: None,
                raw_message: json!({"content": format!("message {}", i)})
                    .try_into()
                    .unwrap(),
            })
            .await
            .unwrap();
        ids.push(message.id);
    }

    let first = kb
        .conversations()
        .messages(conversation.id, &PageRequest::first(3))
        .await
        .unwrap();
    assert_eq!(first.ids(), ids[0..3].to_vec());

    let second = kb
        .conversations()
        .messages(
            conversation.id,
            &PageRequest::after(first.pagination.next_cursor.clone().unwrap(), 3),
        )
        .await
        .unwrap();
    assert_eq!(second.ids(), ids[3..6].to_vec());

    let back = kb
        .conversations()
        .messages(
            conversation.id,
            &PageRequest::before(second.pagination.prev_cursor.clone().unwrap(), 3),
        )
        .await
        .unwrap();
    assert_eq!(back.ids(), first.ids());
}
