//! Conversation command handler.
//!
//! Conversations hold an append-only log of chat messages. Each message keeps
//! its original JSON document verbatim.

use super::{parse_id, PageArgs};
use crate::output::{print_json, print_page};
use clap::{Args, Subcommand};
use kbqa_core::AppResult;
use kbqa_knowledge::{Conversation, KnowledgeBase, Message, NewMessage, RawMessage, Role};
use serde_json::Value;

/// Manage conversations and their messages
#[derive(Args, Debug)]
pub struct ConversationCommand {
    #[command(subcommand)]
    pub action: ConversationAction,
}

#[derive(Subcommand, Debug)]
pub enum ConversationAction {
    /// Start a conversation
    Create(ConversationCreateCommand),
    /// List conversations newest first
    List(ConversationListCommand),
    /// Show one conversation
    Get(ConversationIdCommand),
    /// Delete a conversation and all of its messages
    Delete(ConversationIdCommand),
    /// Append a message to a conversation
    AddMessage(AddMessageCommand),
    /// List a conversation's messages oldest first
    Messages(MessagesCommand),
}

#[derive(Args, Debug)]
pub struct ConversationCreateCommand {
    /// Optional title (at most 200 characters)
    #[arg(short, long)]
    pub title: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConversationListCommand {
    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Args, Debug)]
pub struct ConversationIdCommand {
    /// Conversation id
    pub id: String,
}

#[derive(Args, Debug)]
pub struct AddMessageCommand {
    /// Conversation id
    pub conversation_id: String,

    /// Author role (user, assistant, tool, system)
    #[arg(short, long)]
    pub role: Role,

    /// Message text
    #[arg(short, long)]
    pub content: Option<String>,

    /// Tool call this message answers
    #[arg(long)]
    pub tool_call_id: Option<String>,

    /// Full message document as JSON (built from the other flags when omitted)
    #[arg(long)]
    pub raw: Option<String>,
}

#[derive(Args, Debug)]
pub struct MessagesCommand {
    /// Conversation id
    pub conversation_id: String,

    #[command(flatten)]
    pub page: PageArgs,
}

impl ConversationCommand {
    pub async fn execute(&self, kb: &KnowledgeBase, json: bool) -> AppResult<()> {
        let conversations = kb.conversations();
        match &self.action {
            ConversationAction::Create(cmd) => {
                let conversation = conversations.create(cmd.title.clone()).await?;
                if json {
                    return print_json(&conversation);
                }
                println!("Created conversation {}", conversation.id);
                Ok(())
            }
            ConversationAction::List(cmd) => {
                let page = conversations.list(&cmd.page.request()).await?;
                print_page(&page, json, print_conversation)
            }
            ConversationAction::Get(cmd) => {
                let id = parse_id(&cmd.id)?;
                let conversation = conversations.get(id).await?;
                if json {
                    return print_json(&conversation);
                }
                print_conversation(&conversation);
                println!("  messages: {}", conversations.count_messages(id).await?);
                Ok(())
            }
            ConversationAction::Delete(cmd) => {
                let deleted = conversations.delete(parse_id(&cmd.id)?).await?;
                if json {
                    return print_json(&deleted);
                }
                println!(
                    "Deleted conversation {} ({} messages)",
                    deleted.id, deleted.messages_deleted
                );
                Ok(())
            }
            ConversationAction::AddMessage(cmd) => {
                let message = conversations.add_message(cmd.message()?).await?;
                if json {
                    return print_json(&message);
                }
                println!("Added message {}", message.id);
                Ok(())
            }
            ConversationAction::Messages(cmd) => {
                let page = conversations
                    .messages(parse_id(&cmd.conversation_id)?, &cmd.page.request())
                    .await?;
                print_page(&page, json, print_message)
            }
        }
    }
}

impl AddMessageCommand {
    fn message(&self) -> AppResult<NewMessage> {
        let raw_message = match &self.raw {
            Some(raw) => RawMessage::parse(raw.as_str())?,
            None => {
                let mut doc = serde_json::Map::new();
                doc.insert("role".to_string(), Value::from(self.role.as_str()));
                doc.insert(
                    "content".to_string(),
                    self.content.clone().map(Value::from).unwrap_or(Value::Null),
                );
                if let Some(tool_call_id) = &self.tool_call_id {
                    doc.insert("tool_call_id".to_string(), Value::from(tool_call_id.as_str()));
                }
                RawMessage::try_from(Value::Object(doc))?
            }
        };

        Ok(NewMessage {
            conversation_id: parse_id(&self.conversation_id)?,
            role: self.role,
            content: self.content.clone(),
            tool_call_id: self.tool_call_id.clone(),
            raw_message,
        })
    }
}

fn print_conversation(conversation: &Conversation) {
    println!(
        "{}  {}",
        conversation.id,
        conversation.title.as_deref().unwrap_or("(untitled)")
    );
    println!(
        "  created {}  updated {}",
        conversation.created_at.to_rfc3339(),
        conversation.updated_at.to_rfc3339()
    );
}

fn print_message(message: &Message) {
    println!(
        "{} [{}] {}",
        message.created_at.to_rfc3339(),
        message.role,
        message.content.as_deref().unwrap_or("")
    );
    if let Some(tool_call_id) = &message.tool_call_id {
        println!("  tool_call_id: {}", tool_call_id);
    }
}
