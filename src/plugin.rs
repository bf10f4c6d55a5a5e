//! Turn pipeline
//!
//! A [`Plugin`] owns everything immutable about a conversational skill: its
//! name, the words it listens for, its vocabulary and its flows. One call to
//! [`Plugin::handle_turn`] runs a full turn: load memory, dispatch keywords,
//! advance the active flow, commit. Either every staged write lands or none.

use crate::config::ConfigError;
use crate::flow::{FlowRegistry, StepError};
use crate::memory::{ConversationId, StoreError};
use crate::message::{Message, TurnKind};
use crate::nlp::{self, StructuredInput};
use crate::runtime::traits::MemoryStore;
use crate::state_machine::StateMachine;
use crate::vocab::Vocabulary;
use std::time::Duration;
use thiserror::Error;

/// Why a turn failed. Never shown to users.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Step(#[from] StepError),
    #[error("Message for plugin {got} sent to plugin {expected}")]
    PluginMismatch { expected: String, got: String },
    #[error("Conversation runtime is gone")]
    RuntimeGone,
    #[error("Turn timed out after {0:?}")]
    TimedOut(Duration),
}

/// A named conversational skill
#[derive(Debug)]
pub struct Plugin {
    name: String,
    trigger: StructuredInput,
    vocabulary: Vocabulary,
    flows: FlowRegistry,
}

impl Plugin {
    /// Every flow the vocabulary arms must be registered
    pub fn new(
        name: impl Into<String>,
        trigger: StructuredInput,
        vocabulary: Vocabulary,
        flows: FlowRegistry,
    ) -> Result<Self, ConfigError> {
        if let Some(missing) = vocabulary
            .selectors()
            .into_iter()
            .find(|selector| flows.get(selector).is_none())
        {
            return Err(ConfigError::UnknownFlow(missing.to_string()));
        }
        Ok(Self {
            name: name.into(),
            trigger,
            vocabulary,
            flows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    pub fn conversation(&self, user: impl Into<String>) -> ConversationId {
        ConversationId::new(self.name.clone(), user)
    }

    /// Build a message from raw text, tagging words against the trigger
    pub fn message(&self, user: impl Into<String>, text: impl Into<String>) -> Message {
        let text = text.into();
        let tokens = nlp::tag(&text, &self.trigger);
        Message::new(self.conversation(user), text, tokens)
    }

    /// Run one turn and return the response (possibly empty).
    ///
    /// Nothing is persisted unless the whole turn succeeds.
    pub async fn handle_turn<S: MemoryStore + ?Sized>(
        &self,
        store: &S,
        msg: &Message,
    ) -> Result<String, TurnError> {
        if msg.conversation.plugin != self.name {
            return Err(TurnError::PluginMismatch {
                expected: self.name.clone(),
                got: msg.conversation.plugin.clone(),
            });
        }

        let mut sm = StateMachine::boot(store, &msg.conversation).await?;
        if msg.kind == TurnKind::Initial {
            sm.rewind_entry();
        }

        let booted = sm.selector();
        let mut response = self.vocabulary.dispatch(msg, sm.memory_mut())?;
        if let Some(left) = booted.filter(|flow| sm.selector().as_ref() != Some(flow)) {
            if let Some(flow) = self.flows.get(&left) {
                tracing::debug!(conv = %msg.conversation, flow = %left, "Flow abandoned");
                sm.clear_scratch(flow);
            }
        }
        if response.is_empty() {
            response = self.advance(&mut sm, msg)?;
        }

        let written = sm.commit(store).await?;
        tracing::debug!(
            conv = %msg.conversation,
            written,
            state = ?sm.state(),
            "Turn committed"
        );
        Ok(response)
    }

    fn advance(&self, sm: &mut StateMachine, msg: &Message) -> Result<String, StepError> {
        let Some(selector) = sm.selector() else {
            return Ok(String::new());
        };
        match self.flows.get(&selector) {
            Some(flow) => {
                sm.set_flow(flow.clone());
                sm.advance(msg)
            }
            None => {
                tracing::warn!(
                    conv = %msg.conversation,
                    flow = %selector,
                    "Unknown flow selector, resetting"
                );
                sm.reset();
                Ok(String::new())
            }
        }
    }

    /// Drop the conversation back to idle, clearing the active flow's
    /// working keys
    pub async fn reset<S: MemoryStore + ?Sized>(
        &self,
        store: &S,
        conversation: &ConversationId,
    ) -> Result<(), TurnError> {
        let mut sm = StateMachine::boot(store, conversation).await?;
        if let Some(flow) = sm.selector().and_then(|s| self.flows.get(&s)) {
            sm.set_flow(flow.clone());
        }
        sm.reset();
        sm.commit(store).await?;
        tracing::info!(conv = %conversation, "Conversation reset");
        Ok(())
    }
}
