//! Conversation runtime executor

use super::traits::MemoryStore;
use crate::memory::ConversationId;
use crate::message::Message;
use crate::plugin::{Plugin, TurnError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Work queued for one conversation
#[derive(Debug)]
pub enum Command {
    Turn {
        message: Message,
        reply: oneshot::Sender<Result<String, TurnError>>,
    },
    Reset {
        reply: oneshot::Sender<Result<(), TurnError>>,
    },
    /// Delete everything stored for the conversation
    Forget {
        reply: oneshot::Sender<Result<usize, TurnError>>,
    },
}

/// Single writer for one conversation's memory.
///
/// Commands are handled one at a time in receipt order, so the
/// load → dispatch → advance → commit cycle of a turn never interleaves with
/// another turn of the same conversation.
pub struct ConversationRuntime {
    conversation: ConversationId,
    plugin: Arc<Plugin>,
    store: Arc<dyn MemoryStore>,
    command_rx: mpsc::Receiver<Command>,
    turn_timeout: Duration,
}

impl ConversationRuntime {
    pub fn new(
        conversation: ConversationId,
        plugin: Arc<Plugin>,
        store: Arc<dyn MemoryStore>,
        command_rx: mpsc::Receiver<Command>,
        turn_timeout: Duration,
    ) -> Self {
        Self {
            conversation,
            plugin,
            store,
            command_rx,
            turn_timeout,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(conv = %self.conversation, "Starting conversation runtime");

        while let Some(command) = self.command_rx.recv().await {
            match command {
                Command::Turn { message, reply } => {
                    let result = self.turn(&message).await;
                    if reply.send(result).is_err() {
                        tracing::debug!(conv = %self.conversation, "Turn caller went away");
                    }
                }
                Command::Reset { reply } => {
                    let result = self.plugin.reset(self.store.as_ref(), &self.conversation).await;
                    if let Err(e) = &result {
                        tracing::error!(conv = %self.conversation, error = %e, "Reset failed");
                    }
                    let _ = reply.send(result);
                }
                Command::Forget { reply } => {
                    let result = self
                        .store
                        .forget(&self.conversation)
                        .await
                        .map_err(TurnError::from);
                    match &result {
                        Ok(removed) => {
                            tracing::info!(conv = %self.conversation, removed = *removed, "Conversation forgotten");
                        }
                        Err(e) => {
                            tracing::error!(conv = %self.conversation, error = %e, "Forget failed");
                        }
                    }
                    let _ = reply.send(result);
                }
            }
        }

        tracing::info!(conv = %self.conversation, "Conversation runtime stopped");
    }

    /// Run one turn under the time budget. A turn cut off by the timeout is
    /// dropped before its commit, so it leaves no trace in the store.
    async fn turn(&self, message: &Message) -> Result<String, TurnError> {
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            self.turn_timeout,
            self.plugin.handle_turn(self.store.as_ref(), message),
        )
        .await;

        match outcome {
            Ok(Ok(response)) => {
                tracing::debug!(
                    conv = %self.conversation,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    empty = response.is_empty(),
                    "Turn handled"
                );
                Ok(response)
            }
            Ok(Err(e)) => {
                tracing::error!(conv = %self.conversation, error = %e, "Turn failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    conv = %self.conversation,
                    timeout_ms = u64::try_from(self.turn_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Turn timed out"
                );
                Err(TurnError::TimedOut(self.turn_timeout))
            }
        }
    }
}
