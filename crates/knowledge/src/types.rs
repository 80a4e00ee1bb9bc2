//! Knowledge store type definitions.

use chrono::{DateTime, Utc};
use kbqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum question length in characters.
pub const MAX_QUESTION_CHARS: usize = 1000;

/// Maximum answer length in characters.
pub const MAX_ANSWER_CHARS: usize = 5000;

/// Maximum conversation title length in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Maximum number of ids accepted by a batch lookup.
pub const MAX_BATCH_IDS: usize = 50;

/// A question/answer pair in the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    /// Time-ordered identifier (UUIDv7)
    pub id: Uuid,

    pub question: String,

    pub answer: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Payload for creating or updating a Q&A pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaInput {
    pub question: String,
    pub answer: String,
}

impl QaInput {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    /// Check length bounds on both fields.
    pub fn validate(&self) -> AppResult<()> {
        validate_text("question", &self.question, MAX_QUESTION_CHARS)?;
        validate_text("answer", &self.answer, MAX_ANSWER_CHARS)
    }
}

fn validate_text(field: &str, value: &str, max_chars: usize) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    let len = value.chars().count();
    if len > max_chars {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters (got {})",
            field, max_chars, len
        )));
    }
    Ok(())
}

/// A chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            "system" => Ok(Role::System),
            other => Err(AppError::Validation(format!(
                "role must be one of user, assistant, tool, system (got '{}')",
                other
            ))),
        }
    }
}

/// A message document kept as the exact JSON text the caller supplied.
///
/// Number spellings, key order and inner whitespace all survive storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMessage(Box<RawValue>);

impl RawMessage {
    /// Wrap JSON text, rejecting anything that does not parse.
    ///
    /// Whitespace around the document is dropped.
    pub fn parse(text: impl Into<String>) -> AppResult<Self> {
        RawValue::from_string(text.into())
            .map(Self)
            .map_err(|e| AppError::Validation(format!("raw_message is not valid JSON: {}", e)))
    }

    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Parse the document into a `serde_json::Value`.
    pub fn to_value(&self) -> AppResult<serde_json::Value> {
        Ok(serde_json::from_str(self.0.get())?)
    }

    pub fn is_null(&self) -> bool {
        self.0.get() == "null"
    }
}

impl PartialEq for RawMessage {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl TryFrom<serde_json::Value> for RawMessage {
    type Error = AppError;

    fn try_from(value: serde_json::Value) -> AppResult<Self> {
        Ok(Self(serde_json::value::to_raw_value(&value)?))
    }
}

/// A single message in a conversation. Messages are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,

    pub conversation_id: Uuid,

    pub role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// The original message document, stored verbatim
    pub raw_message: RawMessage,

    pub created_at: DateTime<Utc>,
}

/// Payload for appending a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    pub raw_message: RawMessage,
}

impl NewMessage {
    pub fn validate(&self) -> AppResult<()> {
        if self.raw_message.is_null() {
            return Err(AppError::Validation("raw_message is required".to_string()));
        }
        Ok(())
    }
}

/// Per-leg outcome of a combined Q&A delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    /// True when the relational row was removed
    pub success: bool,
    pub deleted_from_relational: bool,
    pub deleted_from_index: bool,
}

/// A search hit with its score.
///
/// Full-text hits carry no score; semantic hits carry the vector index's
/// native similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult<T> {
    pub entity: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Ranked search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults<T> {
    pub results: Vec<ScoredResult<T>>,
    pub count: usize,
}

impl<T> SearchResults<T> {
    pub fn new(results: Vec<ScoredResult<T>>) -> Self {
        let count = results.len();
        Self { results, count }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}
