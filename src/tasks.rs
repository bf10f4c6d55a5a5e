//! Task library
//!
//! Reusable sub-conversations. Each [`TaskKind`] is a small parameter struct;
//! [`build`] turns it into steps and [`flow`] into a ready-to-register
//! [`Flow`]. Construction is pure, so the same kind always yields the same
//! dialog, which matters because flows are re-resolved from the persisted
//! selector on every turn.

mod address;

pub use address::{AskAddressStep, ConfirmAddressStep};

use crate::config::ConfigError;
use crate::flow::{Completion, Flow, Step, StepError};
use crate::memory::Memory;
use crate::message::Message;
use std::sync::Arc;

const YES_WORDS: &[&str] = &["yes", "yeah", "yep", "yup", "sure", "correct", "right", "ok", "okay", "y"];
const NO_WORDS: &[&str] = &["no", "nope", "nah", "wrong", "incorrect", "n"];

/// A parameterized sub-conversation
#[allow(dead_code)] // RequestText and Confirm are not used by the settings plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Show a link; done on the next input
    Link { prompt: String, url: String },
    /// Ask a free-text question and store the reply under `label`
    RequestText { label: String, prompt: String },
    /// Collect and confirm a street address, stored under `label`
    RequestAddress { label: String },
    /// Ask a yes/no question, stored as a bool under `label`
    Confirm { label: String, question: String },
}

/// Build the steps of a task
pub fn build(kind: &TaskKind) -> Vec<Arc<dyn Step>> {
    match kind {
        TaskKind::Link { prompt, url } => vec![Arc::new(LinkStep {
            prompt: prompt.clone(),
            url: url.clone(),
        }) as Arc<dyn Step>],
        TaskKind::RequestText { label, prompt } => vec![Arc::new(TextStep {
            label: label.clone(),
            prompt: prompt.clone(),
        }) as Arc<dyn Step>],
        TaskKind::RequestAddress { label } => vec![
            Arc::new(AskAddressStep::new(label)) as Arc<dyn Step>,
            Arc::new(ConfirmAddressStep::new(label)),
        ],
        TaskKind::Confirm { label, question } => vec![Arc::new(ConfirmStep {
            label: label.clone(),
            question: question.clone(),
        }) as Arc<dyn Step>],
    }
}

/// Build a task as a flow named `selector`
pub fn flow(selector: &str, kind: &TaskKind) -> Result<Flow, ConfigError> {
    Flow::new(selector, build(kind))
}

/// Marker a task sets once its step has an answer for this run
fn answered_key(label: &str) -> String {
    format!("{label}.answered")
}

/// Yes, no, or neither
pub(crate) fn yes_no(msg: &Message) -> Option<bool> {
    let words = crate::nlp::words(&msg.text);
    if words.iter().any(|w| YES_WORDS.contains(&w.as_str())) {
        Some(true)
    } else if words.iter().any(|w| NO_WORDS.contains(&w.as_str())) {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct LinkStep {
    prompt: String,
    url: String,
}

impl Step for LinkStep {
    fn on_entry(&self, _: &Message, _: &Memory) -> Result<String, StepError> {
        Ok(format!("{} {}", self.prompt, self.url))
    }

    fn on_input(&self, _: &Message, _: &mut Memory) -> Result<(), StepError> {
        Ok(())
    }

    fn complete(&self, _: &Memory) -> Result<Completion, StepError> {
        Ok(Completion::done())
    }
}

#[derive(Debug, Clone)]
pub struct TextStep {
    label: String,
    prompt: String,
}

impl Step for TextStep {
    fn on_entry(&self, _: &Message, _: &Memory) -> Result<String, StepError> {
        Ok(self.prompt.clone())
    }

    fn on_input(&self, msg: &Message, memory: &mut Memory) -> Result<(), StepError> {
        let reply = msg.text.trim();
        if !reply.is_empty() {
            memory.set(self.label.as_str(), reply);
            memory.set(answered_key(&self.label), true);
        }
        Ok(())
    }

    fn complete(&self, memory: &Memory) -> Result<Completion, StepError> {
        Ok(Completion {
            done: memory.get_bool(&answered_key(&self.label)),
            response: None,
        })
    }

    fn scratch_keys(&self) -> Vec<String> {
        vec![answered_key(&self.label)]
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmStep {
    label: String,
    question: String,
}

impl Step for ConfirmStep {
    fn on_entry(&self, _: &Message, _: &Memory) -> Result<String, StepError> {
        Ok(self.question.clone())
    }

    fn on_input(&self, msg: &Message, memory: &mut Memory) -> Result<(), StepError> {
        if let Some(answer) = yes_no(msg) {
            memory.set(self.label.as_str(), answer);
            memory.set(answered_key(&self.label), true);
        }
        Ok(())
    }

    fn complete(&self, memory: &Memory) -> Result<Completion, StepError> {
        Ok(Completion {
            done: memory.get_bool(&answered_key(&self.label)),
            response: None,
        })
    }

    fn scratch_keys(&self) -> Vec<String> {
        vec![answered_key(&self.label)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ConversationId, Snapshot};
    use crate::runtime::testing::test_message;
    use crate::state_machine::StateMachine;

    fn conv() -> ConversationId {
        ConversationId::new("tasks", "u1")
    }

    fn run(kind: &TaskKind) -> StateMachine {
        let mut sm = StateMachine::from_memory(Memory::new(conv(), Snapshot::new()));
        sm.set_flow(flow("task", kind).unwrap());
        sm
    }

    fn say(sm: &mut StateMachine, text: &str) -> String {
        sm.advance(&test_message(conv(), text)).unwrap()
    }

    #[test]
    fn test_build_is_deterministic() {
        let kind = TaskKind::RequestAddress {
            label: "shipping_address".to_string(),
        };
        let a = flow("addr", &kind).unwrap();
        let b = flow("addr", &kind).unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(a.scratch_keys(), b.scratch_keys());
    }

    #[test]
    fn test_link_shows_url_then_finishes() {
        let mut sm = run(&TaskKind::Link {
            prompt: "Add your card at".to_string(),
            url: "https://example.com/cards/new".to_string(),
        });

        assert_eq!(say(&mut sm, "add card"), "Add your card at https://example.com/cards/new");
        assert_eq!(say(&mut sm, "thanks"), "");
        assert!(sm.state().is_idle());
    }

    #[test]
    fn test_request_text_waits_for_non_blank_reply() {
        let mut sm = run(&TaskKind::RequestText {
            label: "nickname".to_string(),
            prompt: "What should I call you?".to_string(),
        });

        assert_eq!(say(&mut sm, "hi"), "What should I call you?");
        assert_eq!(say(&mut sm, "   "), "");
        assert!(!sm.state().is_idle());

        assert_eq!(say(&mut sm, " Ada "), "");
        assert!(sm.state().is_idle());
        assert_eq!(sm.memory().get_str("nickname"), "Ada");
        assert!(!sm.memory().contains("nickname.answered"));
    }

    #[test]
    fn test_confirm_stores_bool() {
        let mut sm = run(&TaskKind::Confirm {
            label: "newsletter".to_string(),
            question: "Want the newsletter?".to_string(),
        });

        assert_eq!(say(&mut sm, "hi"), "Want the newsletter?");
        assert_eq!(say(&mut sm, "hmm"), "");
        assert_eq!(say(&mut sm, "Nope."), "");

        assert!(sm.state().is_idle());
        assert!(sm.memory().contains("newsletter"));
        assert!(!sm.memory().get_bool("newsletter"));
    }

    #[test]
    fn test_yes_no_detection() {
        assert_eq!(yes_no(&test_message(conv(), "Yes, that's right")), Some(true));
        assert_eq!(yes_no(&test_message(conv(), "no thanks")), Some(false));
        assert_eq!(yes_no(&test_message(conv(), "123 Main St")), None);
    }
}
