//! Conversation lifecycle through the service layer.

use super::{knowledge_base, FlakyIndex};
use crate::pagination::PageRequest;
use crate::{NewMessage, RawMessage, Role};
use serde_json::{json, Value};
use uuid::Uuid;

fn message(conversation_id: Uuid, role: Role, raw_message: Value) -> NewMessage {
    NewMessage {
        conversation_id,
        role,
        content: raw_message
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string),
        tool_call_id: raw_message
            .get("tool_call_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        raw_message: raw_message.try_into().unwrap(),
    }
}

#[tokio::test]
async fn add_message_to_missing_conversation_leaves_no_orphan() {
    let kb = knowledge_base(FlakyIndex::new());
    let ghost = Uuid::now_v7();

    let err = kb
        .conversations()
        .add_message(message(ghost, Role::User, json!({"content": "hello?"})))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(kb.conversations().count_messages(ghost).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_conversation_removes_its_messages() {
    let kb = knowledge_base(FlakyIndex::new());
    let conversation = kb
        .conversations()
        .create(Some("Support chat".to_string()))
        .await
        .unwrap();
    let other = kb.conversations().create(None).await.unwrap();

    for i in 0..4 {
        kb.conversations()
            .add_message(message(
                conversation.id,
                Role::User,
                json!({"role": "user", "content": format!("m{}", i)}),
            ))
            .await
            .unwrap();
    }
    kb.conversations()
        .add_message(message(other.id, Role::User, json!({"content": "keep me"})))
        .await
        .unwrap();

    let deleted = kb.conversations().delete(conversation.id).await.unwrap();
    assert_eq!(deleted.id, conversation.id);
    assert_eq!(deleted.messages_deleted, 4);

    assert!(kb
        .conversations()
        .get(conversation.id)
        .await
        .unwrap_err()
        .is_not_found());
    let page = kb
        .conversations()
        .messages(conversation.id, &PageRequest::default())
        .await
        .unwrap();
    assert!(page.data.is_empty());
    assert_eq!(kb.conversations().count_messages(other.id).await.unwrap(), 1);

    // Deleting again reports the missing conversation
    assert!(kb
        .conversations()
        .delete(conversation.id)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn raw_message_is_preserved_verbatim() {
    let kb = knowledge_base(FlakyIndex::new());
    let conversation = kb.conversations().create(None).await.unwrap();

    let raw = json!({
        "role": "assistant",
        "content": null,
        "tool_calls": [{
            "id": "call_1",
            "type": "function",
            "function": {
                "name": "search_knowledge_base",
                "arguments": "{\"query\":\"docker\",\"top_k\":3}"
            }
        }],
        "metadata": {"zeta": 1, "alpha": [true, 2.5, "x"]}
    });
    let stored = kb
        .conversations()
        .add_message(message(conversation.id, Role::Assistant, raw.clone()))
        .await
        .unwrap();
    assert_eq!(stored.content, None);

    let tool_result = json!({
        "role": "tool",
        "tool_call_id": "call_1",
        "content": "Docker is a containerization platform"
    });
    kb.conversations()
        .add_message(message(conversation.id, Role::Tool, tool_result.clone()))
        .await
        .unwrap();

    let page = kb
        .conversations()
        .messages(conversation.id, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);

    assert_eq!(page.data[0].raw_message.to_value().unwrap(), raw);
    assert_eq!(
        page.data[0].raw_message.as_str(),
        serde_json::to_string(&raw).unwrap()
    );
    assert_eq!(page.data[1].role, Role::Tool);
    assert_eq!(page.data[1].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(page.data[1].raw_message.to_value().unwrap(), tool_result);
}

#[tokio::test]
async fn raw_message_keeps_number_spelling_and_spacing() {
    let kb = knowledge_base(FlakyIndex::new());
    let conversation = kb.conversations().create(None).await.unwrap();

    let text = r#"{"role": "assistant",  "n": 123456789012345678901234567890, "f": 1.10, "e": 1e2}"#;
    kb.conversations()
        .add_message(NewMessage {
            conversation_id: conversation.id,
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            raw_message: RawMessage::parse(format!("  {}\n", text)).unwrap(),
        })
        .await
        .unwrap();

    let page = kb
        .conversations()
        .messages(conversation.id, &PageRequest::default())
        .await
        .unwrap();
    let stored = &page.data[0];
    assert_eq!(stored.raw_message.as_str(), text);

    // Serialized messages embed the document text untouched
    let body = serde_json::to_string(stored).unwrap();
    assert!(body.contains(text));
}

#[tokio::test]
async fn appending_refreshes_updated_at_not_listing_order() {
    let kb = knowledge_base(FlakyIndex::new());
    let older = kb.conversations().create(Some("older".to_string())).await.unwrap();
    let newer = kb.conversations().create(Some("newer".to_string())).await.unwrap();

    kb.conversations()
        .add_message(message(older.id, Role::User, json!({"content": "bump"})))
        .await
        .unwrap();

    let refreshed = kb.conversations().get(older.id).await.unwrap();
    assert!(refreshed.updated_at >= older.updated_at);
    assert!(refreshed.updated_at >= newer.created_at);

    // Listing order is by id, not activity
    let page = kb.conversations().list(&PageRequest::default()).await.unwrap();
    assert_eq!(page.ids(), vec![newer.id, older.id]);
}
