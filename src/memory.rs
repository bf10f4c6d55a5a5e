//! Per-conversation memory
//!
//! Memory is a typed key/value map scoped by conversation identity. Each turn
//! works on a [`Memory`]: a snapshot loaded from the store with a staged
//! overlay of writes. Nothing reaches the store until [`Memory::commit`], so a
//! failed turn leaves persisted state exactly as it was loaded.

use crate::runtime::traits::MemoryStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Flow selector; empty means no active flow
pub const FLOW_KEY: &str = "__flow";
/// Ordinal of the active step
pub const STEP_KEY: &str = "__step";
/// Whether the active step's entry action already fired
pub const ENTERED_KEY: &str = "__entered";

/// Identity of one conversation: which plugin, which user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId {
    pub plugin: String,
    pub user: String,
}

impl ConversationId {
    pub fn new(plugin: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            user: user.into(),
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plugin, self.user)
    }
}

/// A typed scalar stored in memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Value {
    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            Value::Str(s) => s.trim().parse().unwrap_or(0),
            Value::Bool(b) => i64::from(*b),
        }
    }

    pub fn as_str(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Str(s) => s == "true",
            Value::Bool(b) => *b,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Everything persisted for one conversation
pub type Snapshot = HashMap<String, Value>;

/// A staged write; `None` removes the key
pub type StagedWrite = (String, Option<Value>);

/// Errors raised by memory stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error("Corrupt value for key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Memory of one conversation for the duration of a turn
#[derive(Debug, Clone)]
pub struct Memory {
    conversation: ConversationId,
    loaded: Snapshot,
    staged: BTreeMap<String, Option<Value>>,
}

impl Memory {
    pub fn new(conversation: ConversationId, loaded: Snapshot) -> Self {
        Self {
            conversation,
            loaded,
            staged: BTreeMap::new(),
        }
    }

    /// Load the persisted memory of a conversation
    pub async fn load<S: MemoryStore + ?Sized>(
        store: &S,
        conversation: &ConversationId,
    ) -> Result<Self, StoreError> {
        let loaded = store.load(conversation).await?;
        Ok(Self::new(conversation.clone(), loaded))
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Current value of a key, `None` when never set (or removed)
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        match self.staged.get(key) {
            Some(staged) => staged.as_ref(),
            None => self.loaded.get(key),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Integer value, zero when unset
    pub fn get_int(&self, key: &str) -> i64 {
        self.lookup(key).map_or(0, Value::as_int)
    }

    /// String value, empty when unset
    pub fn get_str(&self, key: &str) -> String {
        self.lookup(key).map(Value::as_str).unwrap_or_default()
    }

    /// Boolean value, false when unset
    pub fn get_bool(&self, key: &str) -> bool {
        self.lookup(key).is_some_and(Value::as_bool)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.staged.insert(key.into(), Some(value.into()));
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        self.staged.insert(key.into(), None);
    }

    #[allow(dead_code)] // Useful for tests
    pub fn is_dirty(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Writes that differ from what was loaded
    pub fn pending_writes(&self) -> Vec<StagedWrite> {
        self.staged
            .iter()
            .filter(|(key, value)| self.loaded.get(key.as_str()) != value.as_ref())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Discard every staged write
    #[allow(dead_code)] // API completeness
    pub fn rollback(&mut self) {
        self.staged.clear();
    }

    /// Persist all staged writes in one store transaction.
    ///
    /// On failure the staged writes are kept so the caller decides whether to
    /// drop the turn; the store itself is left untouched.
    pub async fn commit<S: MemoryStore + ?Sized>(&mut self, store: &S) -> Result<usize, StoreError> {
        let writes = self.pending_writes();
        if !writes.is_empty() {
            store.commit(&self.conversation, &writes).await?;
        }
        for (key, value) in std::mem::take(&mut self.staged) {
            match value {
                Some(value) => self.loaded.insert(key, value),
                None => self.loaded.remove(&key),
            };
        }
        Ok(writes.len())
    }
}
