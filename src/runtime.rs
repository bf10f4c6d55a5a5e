//! Runtime for executing conversations
//!
//! One [`ConversationRuntime`] task per active conversation, fed through a
//! bounded channel. Unrelated conversations run in parallel; turns of the
//! same conversation are processed strictly in receipt order.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{Command, ConversationRuntime};
pub use traits::*;

use crate::memory::ConversationId;
use crate::message::Message;
use crate::plugin::{Plugin, TurnError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Handle to interact with a running conversation
#[derive(Clone)]
pub struct ConversationHandle {
    pub command_tx: mpsc::Sender<Command>,
}

/// Manager for all conversation runtimes
pub struct RuntimeManager {
    store: Arc<dyn MemoryStore>,
    plugin: Arc<Plugin>,
    runtimes: RwLock<HashMap<ConversationId, ConversationHandle>>,
    queue_depth: usize,
    turn_timeout: Duration,
}

impl RuntimeManager {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        plugin: Arc<Plugin>,
        queue_depth: usize,
        turn_timeout: Duration,
    ) -> Self {
        Self {
            store,
            plugin,
            runtimes: RwLock::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
            turn_timeout,
        }
    }

    pub fn plugin(&self) -> &Arc<Plugin> {
        &self.plugin
    }

    /// Get or create a runtime for a conversation
    pub async fn get_or_create(&self, conversation: &ConversationId) -> ConversationHandle {
        // Check if already running
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(conversation) {
                if !handle.command_tx.is_closed() {
                    return handle.clone();
                }
            }
        }

        let mut runtimes = self.runtimes.write().await;
        // Another caller may have started it while we waited for the lock
        if let Some(handle) = runtimes.get(conversation) {
            if !handle.command_tx.is_closed() {
                return handle.clone();
            }
        }

        let (command_tx, command_rx) = mpsc::channel(self.queue_depth);
        let runtime = ConversationRuntime::new(
            conversation.clone(),
            self.plugin.clone(),
            self.store.clone(),
            command_rx,
            self.turn_timeout,
        );

        let conv = conversation.clone();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(conv = %conv, "Conversation runtime finished");
        });

        let handle = ConversationHandle { command_tx };
        runtimes.insert(conversation.clone(), handle.clone());
        handle
    }

    /// Queue a turn and wait for its response
    pub async fn send_turn(&self, message: Message) -> Result<String, TurnError> {
        if message.conversation.plugin != self.plugin.name() {
            return Err(TurnError::PluginMismatch {
                expected: self.plugin.name().to_string(),
                got: message.conversation.plugin.clone(),
            });
        }

        let handle = self.get_or_create(&message.conversation).await;
        let (reply, response) = oneshot::channel();
        handle
            .command_tx
            .send(Command::Turn { message, reply })
            .await
            .map_err(|_| TurnError::RuntimeGone)?;
        response.await.map_err(|_| TurnError::RuntimeGone)?
    }

    /// Queue a reset behind any pending turns and wait for it
    pub async fn reset(&self, conversation: &ConversationId) -> Result<(), TurnError> {
        let handle = self.get_or_create(conversation).await;
        let (reply, done) = oneshot::channel();
        handle
            .command_tx
            .send(Command::Reset { reply })
            .await
            .map_err(|_| TurnError::RuntimeGone)?;
        done.await.map_err(|_| TurnError::RuntimeGone)?
    }

    /// Queue deletion of a conversation's memory behind any pending turns
    pub async fn forget(&self, conversation: &ConversationId) -> Result<usize, TurnError> {
        let handle = self.get_or_create(conversation).await;
        let (reply, done) = oneshot::channel();
        handle
            .command_tx
            .send(Command::Forget { reply })
            .await
            .map_err(|_| TurnError::RuntimeGone)?;
        done.await.map_err(|_| TurnError::RuntimeGone)?
    }

    /// Conversations with a live runtime
    #[allow(dead_code)] // For future API use
    pub async fn active_conversations(&self) -> Vec<ConversationId> {
        let mut active: Vec<ConversationId> = self
            .runtimes
            .read()
            .await
            .iter()
            .filter(|(_, handle)| !handle.command_tx.is_closed())
            .map(|(conv, _)| conv.clone())
            .collect();
        active.sort();
        active
    }
}
