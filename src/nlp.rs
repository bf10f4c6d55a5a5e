//! Keyword tagging
//!
//! A word-list lookup that tags each word of a message with the type a
//! plugin declared for it in its trigger. Words the trigger does not name are
//! tagged [`WordType::None`].

use crate::message::{Token, WordType};
use std::collections::HashMap;

/// The words a plugin listens for, by type
#[derive(Debug, Clone, Default)]
pub struct StructuredInput {
    pub commands: Vec<String>,
    pub objects: Vec<String>,
    pub actors: Vec<String>,
    pub times: Vec<String>,
    pub places: Vec<String>,
}

impl StructuredInput {
    pub fn new(commands: &[&str], objects: &[&str]) -> Self {
        Self {
            commands: commands.iter().map(ToString::to_string).collect(),
            objects: objects.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    fn lexicon(&self) -> HashMap<String, WordType> {
        let groups = [
            (&self.places, WordType::Place),
            (&self.times, WordType::Time),
            (&self.actors, WordType::Actor),
            (&self.objects, WordType::Object),
            (&self.commands, WordType::Command),
        ];
        // Later groups win on overlap, so commands take precedence
        let mut lexicon = HashMap::new();
        for (words, word_type) in groups {
            for word in words {
                lexicon.insert(word.to_lowercase(), word_type);
            }
        }
        lexicon
    }
}

/// Split text into lowercase words, dropping punctuation
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Tag every word of `text` against the trigger
pub fn tag(text: &str, trigger: &StructuredInput) -> Vec<Token> {
    let lexicon = trigger.lexicon();
    words(text)
        .into_iter()
        .map(|word| {
            let word_type = lexicon.get(&word).copied().unwrap_or(WordType::None);
            Token { word, word_type }
        })
        .collect()
}
