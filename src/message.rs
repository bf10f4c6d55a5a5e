//! Inbound messages

use crate::memory::ConversationId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Word classification produced by the tagger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WordType {
    Command,
    Object,
    Actor,
    Time,
    Place,
    None,
}

/// A word with its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub word: String,
    pub word_type: WordType,
}

impl Token {
    #[allow(dead_code)] // Constructor for API completeness
    pub fn new(word: impl Into<String>, word_type: WordType) -> Self {
        Self {
            word: word.into(),
            word_type,
        }
    }
}

/// How the host routed this message to the plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// A fresh request for the plugin; the current step prompts again
    Initial,
    #[default]
    FollowUp,
}

/// One unit of conversational input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub conversation: ConversationId,
    pub text: String,
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub kind: TurnKind,
    /// Opaque to the engine
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Message {
    pub fn new(conversation: ConversationId, text: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            conversation,
            text: text.into(),
            tokens,
            kind: TurnKind::FollowUp,
            metadata: Map::new(),
        }
    }

    pub fn with_kind(mut self, kind: TurnKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether any token of the given type is one of `words`
    pub fn has_word(&self, word_type: WordType, words: &[&str]) -> bool {
        self.tokens.iter().any(|t| {
            t.word_type == word_type && words.iter().any(|w| w.eq_ignore_ascii_case(&t.word))
        })
    }
}
