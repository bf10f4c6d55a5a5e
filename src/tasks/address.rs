//! Address collection
//!
//! Two steps: ask for an address until one parses as a street address, then
//! ask the user to confirm it. Only a confirmed address is written to the
//! task's label; the candidate lives in a scratch key until then.

use super::yes_no;
use crate::flow::{Completion, Step, StepError};
use crate::memory::Memory;
use crate::message::Message;
use regex::Regex;
use std::sync::OnceLock;

/// A house number followed by at least one word naming the street
const STREET_PATTERN: &str = r"(?i)^\s*\d+[a-z]?(?:-\d+)?\s+(?:[a-z0-9.'-]+\s+)*[a-z][a-z.'-]+";

fn street_pattern() -> Result<&'static Regex, StepError> {
    static PATTERN: OnceLock<Result<Regex, String>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(STREET_PATTERN).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| StepError::Misconfigured(format!("street pattern: {e}")))
}

/// Whether `text` looks like a street address
pub fn is_street_address(text: &str) -> Result<bool, StepError> {
    Ok(street_pattern()?.is_match(text))
}

fn pending_key(label: &str) -> String {
    format!("{label}.pending")
}

fn answer_key(label: &str) -> String {
    format!("{label}.answer")
}

fn describe(label: &str) -> String {
    label.replace('_', " ")
}

/// Asks for an address and keeps it as a candidate
#[derive(Debug, Clone)]
pub struct AskAddressStep {
    label: String,
}

impl AskAddressStep {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Step for AskAddressStep {
    fn on_entry(&self, _: &Message, _: &Memory) -> Result<String, StepError> {
        Ok(format!("What's your {}?", describe(&self.label)))
    }

    fn on_input(&self, msg: &Message, memory: &mut Memory) -> Result<(), StepError> {
        let candidate = msg.text.trim();
        if is_street_address(candidate)? {
            memory.set(pending_key(&self.label), candidate);
        } else {
            tracing::debug!(conv = %msg.conversation, "Not a street address");
        }
        Ok(())
    }

    fn complete(&self, memory: &Memory) -> Result<Completion, StepError> {
        Ok(Completion {
            done: !memory.get_str(&pending_key(&self.label)).is_empty(),
            response: None,
        })
    }

    // A candidate left from an interrupted turn goes straight to confirmation
    fn skip_if_complete(&self) -> bool {
        true
    }

    fn scratch_keys(&self) -> Vec<String> {
        vec![pending_key(&self.label)]
    }
}

/// Confirms the candidate and saves it under the label
#[derive(Debug, Clone)]
pub struct ConfirmAddressStep {
    label: String,
}

impl ConfirmAddressStep {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Step for ConfirmAddressStep {
    fn on_entry(&self, _: &Message, memory: &Memory) -> Result<String, StepError> {
        let candidate = memory.get_str(&pending_key(&self.label));
        if candidate.is_empty() {
            return Err(StepError::Misconfigured(format!(
                "no candidate {} to confirm",
                describe(&self.label)
            )));
        }
        Ok(format!("Is {candidate} correct?"))
    }

    fn on_input(&self, msg: &Message, memory: &mut Memory) -> Result<(), StepError> {
        match yes_no(msg) {
            Some(true) => {
                let candidate = memory.get_str(&pending_key(&self.label));
                memory.set(self.label.as_str(), candidate);
                memory.set(answer_key(&self.label), true);
            }
            Some(false) => memory.set(answer_key(&self.label), false),
            None => {}
        }
        Ok(())
    }

    fn complete(&self, memory: &Memory) -> Result<Completion, StepError> {
        let completion = match memory.lookup(&answer_key(&self.label)) {
            None => Completion::pending(),
            Some(answer) if answer.as_bool() => {
                Completion::done_with(format!("Great! I've saved your {}.", describe(&self.label)))
            }
            Some(_) => Completion::done_with(format!(
                "OK, I won't save that. Ask me to add your {} any time.",
                describe(&self.label)
            )),
        };
        Ok(completion)
    }

    fn scratch_keys(&self) -> Vec<String> {
        vec![answer_key(&self.label)]
    }
}
