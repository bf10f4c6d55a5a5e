//! Vocabulary dispatch
//!
//! Keyword handlers are bound to a word type and a set of trigger words.
//! Tokens are visited in message order and, for each token, handlers in
//! registration order. The first handler to return a non-empty response ends
//! dispatch for the turn. An empty response means the handler only touched
//! memory (usually arming a flow) and dispatch goes on.

use crate::config::ConfigError;
use crate::flow::StepError;
use crate::memory::Memory;
use crate::message::{Message, WordType};
use crate::state_machine::select_flow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Reacts to a trigger word. `position` is the token's index in the message.
pub trait KeywordHandler: Send + Sync {
    fn handle(&self, msg: &Message, memory: &mut Memory, position: usize)
        -> Result<String, StepError>;

    /// The flow this handler always arms, if it is that simple
    fn selects(&self) -> Option<&str> {
        None
    }
}

impl<F> KeywordHandler for F
where
    F: Fn(&Message, &mut Memory, usize) -> Result<String, StepError> + Send + Sync,
{
    fn handle(
        &self,
        msg: &Message,
        memory: &mut Memory,
        position: usize,
    ) -> Result<String, StepError> {
        self(msg, memory, position)
    }
}

/// Arms a flow without answering
#[derive(Debug, Clone)]
pub struct SelectFlow {
    selector: String,
}

impl SelectFlow {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

impl KeywordHandler for SelectFlow {
    fn handle(&self, _: &Message, memory: &mut Memory, _: usize) -> Result<String, StepError> {
        select_flow(memory, &self.selector);
        Ok(String::new())
    }

    fn selects(&self) -> Option<&str> {
        Some(&self.selector)
    }
}

/// Answers immediately with fixed text
#[allow(dead_code)] // For plugins with canned answers
#[derive(Debug, Clone)]
pub struct Reply {
    text: String,
}

#[allow(dead_code)]
impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl KeywordHandler for Reply {
    fn handle(&self, _: &Message, _: &mut Memory, _: usize) -> Result<String, StepError> {
        Ok(self.text.clone())
    }
}

/// A registered (word type, words) → handler binding
#[derive(Clone)]
pub struct VocabHandler {
    pub word_type: WordType,
    pub words: BTreeSet<String>,
    handler: Arc<dyn KeywordHandler>,
}

impl VocabHandler {
    fn matches(&self, word_type: WordType, word: &str) -> bool {
        self.word_type == word_type && self.words.contains(&word.to_lowercase())
    }
}

impl fmt::Debug for VocabHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VocabHandler")
            .field("word_type", &self.word_type)
            .field("words", &self.words)
            .finish_non_exhaustive()
    }
}

/// Collects handlers and validates them into a [`Vocabulary`]
#[derive(Default)]
pub struct VocabularyBuilder {
    entries: Vec<(WordType, Vec<String>, Arc<dyn KeywordHandler>)>,
}

impl VocabularyBuilder {
    pub fn handler(
        mut self,
        word_type: WordType,
        words: &[&str],
        handler: impl KeywordHandler + 'static,
    ) -> Self {
        let handler: Arc<dyn KeywordHandler> = Arc::new(handler);
        self.entries.push((
            word_type,
            words.iter().map(ToString::to_string).collect(),
            handler,
        ));
        self
    }

    /// Register a closure handler
    pub fn on<F>(self, word_type: WordType, words: &[&str], f: F) -> Self
    where
        F: Fn(&Message, &mut Memory, usize) -> Result<String, StepError> + Send + Sync + 'static,
    {
        self.handler(word_type, words, f)
    }

    /// Shorthand for a handler that arms `selector`
    pub fn select(self, word_type: WordType, words: &[&str], selector: &str) -> Self {
        self.handler(word_type, words, SelectFlow::new(selector))
    }

    pub fn build(self) -> Result<Vocabulary, ConfigError> {
        let mut handlers: Vec<VocabHandler> = Vec::with_capacity(self.entries.len());

        for (index, (word_type, words, handler)) in self.entries.into_iter().enumerate() {
            if words.is_empty() {
                return Err(ConfigError::EmptyWordSet(index));
            }
            if words.iter().any(|w| w.trim().is_empty()) {
                return Err(ConfigError::BlankWord(index));
            }
            let words: BTreeSet<String> = words.iter().map(|w| w.trim().to_lowercase()).collect();

            if let Some(earlier) = handlers
                .iter()
                .position(|h| h.word_type == word_type && h.words == words)
            {
                return Err(ConfigError::DuplicateTrigger {
                    handler: index,
                    earlier,
                });
            }

            handlers.push(VocabHandler {
                word_type,
                words,
                handler,
            });
        }

        Ok(Vocabulary { handlers })
    }
}

/// Immutable table of keyword handlers
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    handlers: Vec<VocabHandler>,
}

impl Vocabulary {
    pub fn builder() -> VocabularyBuilder {
        VocabularyBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[allow(dead_code)] // API completeness
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Flows armed by stock [`SelectFlow`] handlers, in registration order
    pub fn selectors(&self) -> Vec<&str> {
        self.handlers
            .iter()
            .filter_map(|h| h.handler.selects())
            .collect()
    }

    /// Run matching handlers; returns the first non-empty response, or empty
    pub fn dispatch(&self, msg: &Message, memory: &mut Memory) -> Result<String, StepError> {
        for (position, token) in msg.tokens.iter().enumerate() {
            for (index, entry) in self.handlers.iter().enumerate() {
                if !entry.matches(token.word_type, &token.word) {
                    continue;
                }
                tracing::debug!(
                    conv = %msg.conversation,
                    word = %token.word,
                    handler = index,
                    position,
                    "Keyword matched"
                );
                let response = entry.handler.handle(msg, memory, position)?;
                if !response.is_empty() {
                    return Ok(response);
                }
            }
        }
        Ok(String::new())
    }
}
