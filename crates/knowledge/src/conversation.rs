//! Conversation operations.

use crate::db::ConversationRepository;
use crate::pagination::{Page, PageRequest};
use crate::types::{Conversation, Message, NewMessage};
use kbqa_core::AppResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of deleting a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDeleted {
    pub id: Uuid,
    pub messages_deleted: usize,
}

#[derive(Clone)]
pub struct ConversationService {
    repo: ConversationRepository,
}

impl ConversationService {
    pub fn new(repo: ConversationRepository) -> Self {
        Self { repo }
    }

    pub async fn create(&self, title: Option<String>) -> AppResult<Conversation> {
        let conversation = self.repo.create(title).await?;
        tracing::info!(id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Conversation> {
        self.repo.get(id).await
    }

    pub async fn list(&self, request: &PageRequest) -> AppResult<Page<Conversation>> {
        self.repo.list(request).await
    }

    /// Delete a conversation together with its messages.
    pub async fn delete(&self, id: Uuid) -> AppResult<ConversationDeleted> {
        let messages_deleted = self.repo.delete(id).await?;
        tracing::info!(id = %id, messages_deleted, "Deleted conversation");
        Ok(ConversationDeleted {
            id,
            messages_deleted,
        })
    }

    pub async fn add_message(&self, message: NewMessage) -> AppResult<Message> {
        self.repo.add_message(message).await
    }

    pub async fn messages(&self, conversation_id: Uuid, request: &PageRequest) -> AppResult<Page<Message>> {
        self.repo.messages(conversation_id, request).await
    }

    pub async fn count_messages(&self, conversation_id: Uuid) -> AppResult<u64> {
        self.repo.count_messages(conversation_id).await
    }
}
