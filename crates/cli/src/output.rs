//! Rendering of command results and errors.
//!
//! Data goes to stdout; diagnostics go to stderr through `tracing`.

use kbqa_core::{AppError, AppResult};
use kbqa_knowledge::{CursorPagination, Page, QaPair};
use serde::Serialize;

/// Error body printed on stdout in `--json` mode.
#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: &'static str,
    code: &'static str,
    message: &'a str,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_error(error: &AppError, json: bool) {
    if json {
        let message = error.to_string();
        let envelope = ErrorEnvelope {
            error: "error",
            code: error.code(),
            message: &message,
        };
        match serde_json::to_string_pretty(&envelope) {
            Ok(body) => println!("{}", body),
            Err(_) => eprintln!("Error: {}", error),
        }
    } else {
        eprintln!("Error: {}", error);
    }
}

pub fn print_pair(pair: &QaPair) {
    println!("{}", pair.id);
    println!("  Q: {}", pair.question);
    println!("  A: {}", pair.answer);
    println!(
        "  created {}  updated {}",
        pair.created_at.to_rfc3339(),
        pair.updated_at.to_rfc3339()
    );
}

/// Human-readable page footer with the cursors to continue from.
pub fn print_pagination(pagination: &CursorPagination) {
    let mut parts = Vec::new();
    if pagination.has_prev {
        if let Some(cursor) = &pagination.prev_cursor {
            parts.push(format!("prev: --cursor {} --direction prev", cursor));
        }
    }
    if pagination.has_next {
        match &pagination.next_cursor {
            Some(cursor) => parts.push(format!("next: --cursor {}", cursor)),
            None => parts.push("more results available".to_string()),
        }
    }
    if !parts.is_empty() {
        println!("({})", parts.join("; "));
    }
}

/// Print a page as JSON or as one block per item.
pub fn print_page<T: Serialize>(page: &Page<T>, json: bool, render: impl Fn(&T)) -> AppResult<()> {
    if json {
        return print_json(page);
    }
    if page.data.is_empty() {
        println!("(no results)");
    }
    for item in &page.data {
        render(item);
    }
    print_pagination(&page.pagination);
    Ok(())
}
