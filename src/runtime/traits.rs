//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the turn pipeline with mock implementations.

use crate::db::{Database, DbError};
use crate::memory::{ConversationId, Snapshot, StagedWrite, StoreError, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable per-conversation key/value storage
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Everything stored for a conversation (empty when never written)
    async fn load(&self, conversation: &ConversationId) -> Result<Snapshot, StoreError>;

    /// A single key
    #[allow(dead_code)] // API completeness
    async fn get(&self, conversation: &ConversationId, key: &str)
        -> Result<Option<Value>, StoreError>;

    /// Apply all writes atomically
    async fn commit(
        &self,
        conversation: &ConversationId,
        writes: &[StagedWrite],
    ) -> Result<(), StoreError>;

    /// Delete every key of a conversation; returns how many were removed
    async fn forget(&self, conversation: &ConversationId) -> Result<usize, StoreError>;
}

// ============================================================================
// Arc implementation for trait objects
// ============================================================================

#[async_trait]
impl<T: MemoryStore + ?Sized> MemoryStore for Arc<T> {
    async fn load(&self, conversation: &ConversationId) -> Result<Snapshot, StoreError> {
        (**self).load(conversation).await
    }

    async fn get(
        &self,
        conversation: &ConversationId,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        (**self).get(conversation, key).await
    }

    async fn commit(
        &self,
        conversation: &ConversationId,
        writes: &[StagedWrite],
    ) -> Result<(), StoreError> {
        (**self).commit(conversation, writes).await
    }

    async fn forget(&self, conversation: &ConversationId) -> Result<usize, StoreError> {
        (**self).forget(conversation).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use Database as a memory store
#[derive(Clone)]
pub struct DatabaseMemoryStore {
    db: Database,
}

impl DatabaseMemoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn inner(&self) -> &Database {
        &self.db
    }
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::CorruptValue { key, source, .. } => StoreError::Corrupt {
                key,
                reason: source.to_string(),
            },
            DbError::LockPoisoned => StoreError::Unavailable("database lock poisoned".to_string()),
            other => StoreError::WriteFailed(other.to_string()),
        }
    }
}

#[async_trait]
impl MemoryStore for DatabaseMemoryStore {
    async fn load(&self, conversation: &ConversationId) -> Result<Snapshot, StoreError> {
        self.db
            .load_memory(conversation)
            .map_err(|e| match e {
                DbError::Sqlite(e) => StoreError::Unavailable(e.to_string()),
                other => other.into(),
            })
    }

    async fn get(
        &self,
        conversation: &ConversationId,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.db.get_memory(conversation, key)?)
    }

    async fn commit(
        &self,
        conversation: &ConversationId,
        writes: &[StagedWrite],
    ) -> Result<(), StoreError> {
        Ok(self.db.commit_memory(conversation, writes)?)
    }

    async fn forget(&self, conversation: &ConversationId) -> Result<usize, StoreError> {
        Ok(self.db.forget_conversation(conversation)?)
    }
}
