//! Relational schema. Every statement is idempotent.

use super::sql_err;
use kbqa_core::AppResult;
use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS qa_pairs (
    pk INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS qa_pairs_fts USING fts5(
    question,
    answer,
    content = 'qa_pairs',
    content_rowid = 'pk',
    tokenize = 'porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS qa_pairs_ai AFTER INSERT ON qa_pairs BEGIN
    INSERT INTO qa_pairs_fts (rowid, question, answer)
    VALUES (new.pk, new.question, new.answer);
END;

CREATE TRIGGER IF NOT EXISTS qa_pairs_ad AFTER DELETE ON qa_pairs BEGIN
    INSERT INTO qa_pairs_fts (qa_pairs_fts, rowid, question, answer)
    VALUES ('delete', old.pk, old.question, old.answer);
END;

CREATE TRIGGER IF NOT EXISTS qa_pairs_au AFTER UPDATE ON qa_pairs BEGIN
    INSERT INTO qa_pairs_fts (qa_pairs_fts, rowid, question, answer)
    VALUES ('delete', old.pk, old.question, old.answer);
    INSERT INTO qa_pairs_fts (rowid, question, answer)
    VALUES (new.pk, new.question, new.answer);
END;

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    title TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations (id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'tool', 'system')),
    content TEXT,
    tool_call_id TEXT,
    raw_message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Time-range lookups within a conversation
CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
    ON messages (conversation_id, created_at DESC, id);

-- Cursor paging. UUIDv7 ids sort in creation order, so id order is created_at order.
CREATE INDEX IF NOT EXISTS idx_messages_conversation_id
    ON messages (conversation_id, id);

CREATE TABLE IF NOT EXISTS index_ledger (
    entity_id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    last_error TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_index_ledger_state ON index_ledger (state);
"#;

/// Create tables, indexes and triggers if they are missing.
pub(super) fn apply(conn: &Connection) -> AppResult<()> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(sql_err("read schema version"))?;

    conn.execute_batch(SCHEMA)
        .map_err(sql_err("apply schema"))?;

    if version < SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))
            .map_err(sql_err("record schema version"))?;
        tracing::debug!(from = version, to = SCHEMA_VERSION, "Schema version updated");
    }

    Ok(())
}
