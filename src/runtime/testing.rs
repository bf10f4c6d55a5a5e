//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::flow::FnStep;
use crate::memory::{ConversationId, Snapshot, StagedWrite, StoreError, Value};
use crate::message::{Message, Token, WordType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory memory store for testing
#[derive(Default)]
pub struct InMemoryStore {
    conversations: Mutex<HashMap<ConversationId, Snapshot>>,
    /// Number of successful commits
    pub commits: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything stored for a conversation
    pub fn snapshot(&self, conversation: &ConversationId) -> Snapshot {
        self.conversations
            .lock()
            .unwrap()
            .get(conversation)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self, conversation: &ConversationId) -> Result<Snapshot, StoreError> {
        Ok(self.snapshot(conversation))
    }

    async fn get(
        &self,
        conversation: &ConversationId,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.snapshot(conversation).get(key).cloned())
    }

    async fn commit(
        &self,
        conversation: &ConversationId,
        writes: &[StagedWrite],
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock().unwrap();
        let snapshot = conversations.entry(conversation.clone()).or_default();
        for (key, value) in writes {
            match value {
                Some(value) => snapshot.insert(key.clone(), value.clone()),
                None => snapshot.remove(key),
            };
        }
        if snapshot.is_empty() {
            conversations.remove(conversation);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn forget(&self, conversation: &ConversationId) -> Result<usize, StoreError> {
        let removed = self.conversations.lock().unwrap().remove(conversation);
        Ok(removed.map_or(0, |snapshot| snapshot.len()))
    }
}

// ============================================================================
// Failing Store (for atomicity testing)
// ============================================================================

/// In-memory store whose loads and commits can be made to fail
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryStore,
    fail_loads: AtomicBool,
    fail_commits: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MemoryStore for FailingStore {
    async fn load(&self, conversation: &ConversationId) -> Result<Snapshot, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected load failure".to_string()));
        }
        self.inner.load(conversation).await
    }

    async fn get(
        &self,
        conversation: &ConversationId,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected load failure".to_string()));
        }
        self.inner.get(conversation, key).await
    }

    async fn commit(
        &self,
        conversation: &ConversationId,
        writes: &[StagedWrite],
    ) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("injected commit failure".to_string()));
        }
        self.inner.commit(conversation, writes).await
    }

    async fn forget(&self, conversation: &ConversationId) -> Result<usize, StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("injected commit failure".to_string()));
        }
        self.inner.forget(conversation).await
    }
}

// ============================================================================
// Delayed Store (for ordering and timeout testing)
// ============================================================================

/// In-memory store that sleeps before every load and commit; forgets at once
pub struct DelayedStore {
    inner: InMemoryStore,
    delay: Duration,
}

impl DelayedStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryStore::new(),
            delay,
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

#[async_trait]
impl MemoryStore for DelayedStore {
    async fn load(&self, conversation: &ConversationId) -> Result<Snapshot, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.load(conversation).await
    }

    async fn get(
        &self,
        conversation: &ConversationId,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(conversation, key).await
    }

    async fn commit(
        &self,
        conversation: &ConversationId,
        writes: &[StagedWrite],
    ) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.commit(conversation, writes).await
    }

    async fn forget(&self, conversation: &ConversationId) -> Result<usize, StoreError> {
        self.inner.forget(conversation).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A message with every word tagged `None`
pub fn test_message(conversation: ConversationId, text: &str) -> Message {
    let tokens = crate::nlp::words(text)
        .into_iter()
        .map(|w| Token::new(w, WordType::None))
        .collect();
    Message::new(conversation, text, tokens)
}

/// A fixed-prompt step that counts how often its entry fires
pub fn counting_step(prompt: &str, entries: Arc<AtomicUsize>) -> FnStep {
    let prompt = prompt.to_string();
    FnStep::new(move |_, _| {
        entries.fetch_add(1, Ordering::SeqCst);
        Ok(prompt.clone())
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(user: &str) -> ConversationId {
        ConversationId::new("settings", user)
    }

    #[tokio::test]
    async fn test_in_memory_store_scopes_by_conversation() {
        let store = InMemoryStore::new();

        store
            .commit(&conv("a"), &[("state".to_string(), Some(Value::Int(1)))])
            .await
            .unwrap();
        store
            .commit(&conv("b"), &[("state".to_string(), Some(Value::Int(2)))])
            .await
            .unwrap();

        assert_eq!(store.get(&conv("a"), "state").await.unwrap(), Some(Value::Int(1)));
        assert_eq!(store.get(&conv("b"), "state").await.unwrap(), Some(Value::Int(2)));
        assert_eq!(store.commits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_in_memory_store_removals() {
        let store = InMemoryStore::new();
        store
            .commit(&conv("a"), &[("state".to_string(), Some(Value::Int(1)))])
            .await
            .unwrap();
        store
            .commit(&conv("a"), &[("state".to_string(), None)])
            .await
            .unwrap();

        assert!(store.snapshot(&conv("a")).is_empty());
    }

    #[tokio::test]
    async fn test_failing_store_toggles() {
        let store = FailingStore::new();
        store.fail_commits(true);
        assert!(store.commit(&conv("a"), &[]).await.is_err());

        store.fail_commits(false);
        assert!(store.commit(&conv("a"), &[]).await.is_ok());

        store.fail_loads(true);
        assert!(matches!(
            store.load(&conv("a")).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn test_message_helper_tags_none() {
        let msg = test_message(conv("a"), "Add my card!");
        assert_eq!(msg.tokens.len(), 3);
        assert!(msg.tokens.iter().all(|t| t.word_type == WordType::None));
    }
}
