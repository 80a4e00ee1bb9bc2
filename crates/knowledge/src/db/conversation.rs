//! Conversation and message persistence.

use super::{format_ts, now, sql_err, ts_col, uuid_col, Database};
use crate::pagination::{KeysetQuery, Page, PageRequest, SortOrder};
use crate::types::{Conversation, Message, NewMessage, RawMessage, MAX_TITLE_CHARS};
use kbqa_core::{AppError, AppResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, title, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, role, content, tool_call_id, raw_message, created_at";

const CONVERSATIONS: KeysetQuery = KeysetQuery {
    table: "conversations",
    columns: CONVERSATION_COLUMNS,
    scope_column: None,
    order: SortOrder::NewestFirst,
};

const MESSAGES: KeysetQuery = KeysetQuery {
    table: "messages",
    columns: MESSAGE_COLUMNS,
    scope_column: Some("conversation_id"),
    order: SortOrder::OldestFirst,
};

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: uuid_col(row, 0)?,
        title: row.get(1)?,
        created_at: ts_col(row, 2)?,
        updated_at: ts_col(row, 3)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let raw: String = row.get(5)?;
    Ok(Message {
        id: uuid_col(row, 0)?,
        conversation_id: uuid_col(row, 1)?,
        role: role
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        content: row.get(3)?,
        tool_call_id: row.get(4)?,
        raw_message: RawMessage::parse(raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        created_at: ts_col(row, 6)?,
    })
}

fn find_conversation(conn: &Connection, id: Uuid) -> AppResult<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS),
        [id.to_string()],
        map_conversation,
    )
    .optional()
    .map_err(sql_err("read conversation"))
}

/// Trim a title, dropping it when blank.
fn normalize_title(title: Option<String>) -> AppResult<Option<String>> {
    let Some(title) = title else {
        return Ok(None);
    };
    let title = title.trim();
    if title.is_empty() {
        return Ok(None);
    }
    let len = title.chars().count();
    if len > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "title must be at most {} characters (got {})",
            MAX_TITLE_CHARS, len
        )));
    }
    Ok(Some(title.to_string()))
}

/// Repository for conversations and their append-only message log.
#[derive(Clone)]
pub struct ConversationRepository {
    db: Database,
}

impl ConversationRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, title: Option<String>) -> AppResult<Conversation> {
        let ts = now();
        let conversation = Conversation {
            id: Uuid::now_v7(),
            title: normalize_title(title)?,
            created_at: ts,
            updated_at: ts,
        };

        let row = conversation.clone();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        row.id.to_string(),
                        row.title,
                        format_ts(&row.created_at),
                        format_ts(&row.updated_at),
                    ],
                )
                .map_err(sql_err("insert conversation"))?;
                Ok(())
            })
            .await?;

        tracing::debug!(id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Conversation> {
        self.db
            .with_conn(move |conn| find_conversation(conn, id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("conversation {} not found", id)))
    }

    pub async fn list(&self, request: &PageRequest) -> AppResult<Page<Conversation>> {
        let page = request.resolve()?;
        self.db
            .with_conn(move |conn| CONVERSATIONS.fetch(conn, None, &page, map_conversation))
            .await
    }

    /// Delete a conversation and all of its messages in one transaction.
    ///
    /// Returns the number of messages removed.
    pub async fn delete(&self, id: Uuid) -> AppResult<usize> {
        self.db
            .with_conn(move |conn| {
                let key = id.to_string();
                let tx = conn.transaction().map_err(sql_err("begin transaction"))?;

                let messages = tx
                    .execute("DELETE FROM messages WHERE conversation_id = ?1", [&key])
                    .map_err(sql_err("delete messages"))?;
                let removed = tx
                    .execute("DELETE FROM conversations WHERE id = ?1", [&key])
                    .map_err(sql_err("delete conversation"))?;

                if removed == 0 {
                    // Dropping the transaction rolls it back
                    return Err(AppError::NotFound(format!("conversation {} not found", id)));
                }

                tx.commit().map_err(sql_err("commit delete"))?;
                Ok(messages)
            })
            .await
    }

    /// Append a message, refreshing the parent's `updated_at`.
    ///
    /// Fails with `NotFound` when the conversation does not exist.
    pub async fn add_message(&self, message: NewMessage) -> AppResult<Message> {
        message.validate()?;

        let raw = message.raw_message.as_str().to_string();
        let stored = Message {
            id: Uuid::now_v7(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            tool_call_id: message.tool_call_id,
            raw_message: message.raw_message,
            created_at: now(),
        };

        let row = stored.clone();
        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction().map_err(sql_err("begin transaction"))?;
                let conversation_id = row.conversation_id.to_string();

                let exists = tx
                    .query_row(
                        "SELECT 1 FROM conversations WHERE id = ?1",
                        [&conversation_id],
                        |_| Ok(()),
                    )
                    .optional()
                    .map_err(sql_err("check conversation"))?
                    .is_some();
                if !exists {
                    return Err(AppError::NotFound(format!(
                        "conversation {} not found",
                        row.conversation_id
                    )));
                }

                let created_at = format_ts(&row.created_at);
                tx.execute(
                    "INSERT INTO messages (id, conversation_id, role, content, tool_call_id, raw_message, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        row.id.to_string(),
                        conversation_id,
                        row.role.as_str(),
                        row.content,
                        row.tool_call_id,
                        raw,
                        created_at,
                    ],
                )
                .map_err(sql_err("insert message"))?;

                tx.execute(
                    "UPDATE conversations SET updated_at = ?1 WHERE id = ?2 AND updated_at < ?1",
                    params![created_at, conversation_id],
                )
                .map_err(sql_err("touch conversation"))?;

                tx.commit().map_err(sql_err("commit message"))?;
                Ok(())
            })
            .await?;

        tracing::debug!(
            id = %stored.id,
            conversation_id = %stored.conversation_id,
            role = %stored.role,
            "Appended message"
        );
        Ok(stored)
    }

    /// Messages of a conversation in creation order.
    ///
    /// An unknown conversation yields an empty page.
    pub async fn messages(
        &self,
        conversation_id: Uuid,
        request: &PageRequest,
    ) -> AppResult<Page<Message>> {
        let page = request.resolve()?;
        self.db
            .with_conn(move |conn| {
                let scope = conversation_id.to_string();
                MESSAGES.fetch(conn, Some(&scope), &page, map_message)
            })
            .await
    }

    pub async fn count_messages(&self, conversation_id: Uuid) -> AppResult<u64> {
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                    [conversation_id.to_string()],
                    |row| row.get::<_, i64>(0),
                )
                .map(|n| n as u64)
                .map_err(sql_err("count messages"))
            })
            .await
    }
}
