//! Command handlers for the KBQA CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod conversation;
pub mod qa;

// Re-export command types for convenience
pub use conversation::ConversationCommand;
pub use qa::QaCommand;

use clap::Args;
use kbqa_core::{AppError, AppResult};
use kbqa_knowledge::{Direction, PageRequest};
use uuid::Uuid;

/// Cursor pagination flags shared by listing commands.
#[derive(Args, Debug, Clone)]
pub struct PageArgs {
    /// Page size (1-100, default 10)
    #[arg(short, long)]
    pub limit: Option<i64>,

    /// Id to continue from
    #[arg(long)]
    pub cursor: Option<String>,

    /// Direction relative to the cursor (next or prev)
    #[arg(long, default_value_t = Direction::Next)]
    pub direction: Direction,
}

impl PageArgs {
    pub fn request(&self) -> PageRequest {
        PageRequest {
            limit: self.limit,
            cursor: self.cursor.clone(),
            direction: self.direction,
        }
    }
}

/// Parse a positional id argument.
pub fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("invalid id '{}'", raw)))
}
