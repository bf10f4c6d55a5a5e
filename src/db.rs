//! Database module for convflow
//!
//! Provides SQLite persistence for per-conversation memory.

mod schema;

pub use schema::*;

use crate::memory::{ConversationId, Snapshot, StagedWrite, Value, FLOW_KEY};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt value for {conversation} key {key}: {source}")]
    CorruptValue {
        conversation: ConversationId,
        key: String,
        source: serde_json::Error,
    },
    #[error("Value encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    /// Run raw SQL against the connection
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> DbResult<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    // ==================== Memory Operations ====================

    /// Load every key stored for a conversation
    pub fn load_memory(&self, conversation: &ConversationId) -> DbResult<Snapshot> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM memory WHERE plugin = ?1 AND user_id = ?2")?;

        let rows = stmt.query_map(params![conversation.plugin, conversation.user], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshot = Snapshot::new();
        for row in rows {
            let (key, raw) = row?;
            let value = decode_value(conversation, &key, &raw)?;
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }

    /// Get a single key
    pub fn get_memory(&self, conversation: &ConversationId, key: &str) -> DbResult<Option<Value>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT value FROM memory WHERE plugin = ?1 AND user_id = ?2 AND key = ?3",
        )?;

        let raw = stmt
            .query_row(params![conversation.plugin, conversation.user, key], |row| {
                row.get::<_, String>(0)
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        raw.map(|raw| decode_value(conversation, key, &raw))
            .transpose()
    }

    /// Set a single key (last write wins)
    #[allow(dead_code)] // Used in tests
    pub fn set_memory(
        &self,
        conversation: &ConversationId,
        key: &str,
        value: &Value,
    ) -> DbResult<()> {
        self.commit_memory(conversation, &[(key.to_string(), Some(value.clone()))])
    }

    /// Apply a batch of writes in one transaction; either all land or none do
    pub fn commit_memory(
        &self,
        conversation: &ConversationId,
        writes: &[StagedWrite],
    ) -> DbResult<()> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;

        for (key, value) in writes {
            match value {
                Some(value) => {
                    let raw = serde_json::to_string(value)?;
                    tx.execute(
                        "INSERT INTO memory (plugin, user_id, key, value, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT (plugin, user_id, key)
                         DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                        params![conversation.plugin, conversation.user, key, raw, now],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM memory WHERE plugin = ?1 AND user_id = ?2 AND key = ?3",
                        params![conversation.plugin, conversation.user, key],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Full rows for a conversation, ordered by key
    pub fn list_memory(&self, conversation: &ConversationId) -> DbResult<Vec<MemoryRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT key, value, updated_at FROM memory
             WHERE plugin = ?1 AND user_id = ?2
             ORDER BY key",
        )?;

        let rows = stmt.query_map(params![conversation.plugin, conversation.user], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (key, raw, updated_at) = row?;
            out.push(MemoryRow {
                conversation: conversation.clone(),
                value: decode_value(conversation, &key, &raw)?,
                key,
                updated_at: parse_datetime(&updated_at),
            });
        }
        Ok(out)
    }

    /// Conversations of a plugin with stored memory, most recently updated first
    pub fn list_conversations(&self, plugin: &str) -> DbResult<Vec<ConversationSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.user_id, COUNT(*),
                    (SELECT f.value FROM memory f
                     WHERE f.plugin = m.plugin AND f.user_id = m.user_id AND f.key = ?2)
             FROM memory m
             WHERE m.plugin = ?1
             GROUP BY m.user_id
             ORDER BY MAX(m.updated_at) DESC",
        )?;

        let rows = stmt.query_map(params![plugin, FLOW_KEY], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (user, key_count, flow_raw) = row?;
            let conversation = ConversationId::new(plugin, user);
            let active_flow = match flow_raw {
                Some(raw) => Some(decode_value(&conversation, FLOW_KEY, &raw)?.as_str())
                    .filter(|flow| !flow.is_empty()),
                None => None,
            };
            out.push(ConversationSummary {
                conversation,
                key_count,
                active_flow,
            });
        }
        Ok(out)
    }

    /// Delete every key of a conversation
    pub fn forget_conversation(&self, conversation: &ConversationId) -> DbResult<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM memory WHERE plugin = ?1 AND user_id = ?2",
            params![conversation.plugin, conversation.user],
        )?;
        Ok(deleted)
    }
}

fn decode_value(conversation: &ConversationId, key: &str, raw: &str) -> DbResult<Value> {
    serde_json::from_str(raw).map_err(|source| DbError::CorruptValue {
        conversation: conversation.clone(),
        key: key.to_string(),
        source,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
