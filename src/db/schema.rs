//! Database schema and row types

use crate::memory::{ConversationId, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS memory (
    plugin TEXT NOT NULL,
    user_id TEXT NOT NULL,
    key TEXT NOT NULL CHECK (length(key) > 0),
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (plugin, user_id, key)
);

CREATE INDEX IF NOT EXISTS idx_memory_conversation ON memory(plugin, user_id);
CREATE INDEX IF NOT EXISTS idx_memory_updated ON memory(updated_at DESC);
";

/// One persisted memory entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRow {
    pub conversation: ConversationId,
    pub key: String,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

/// Summary of a conversation that has stored memory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub conversation: ConversationId,
    pub key_count: i64,
    pub active_flow: Option<String>,
}
