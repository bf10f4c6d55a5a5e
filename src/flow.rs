//! Flows and steps
//!
//! A [`Flow`] is a named, ordered, non-empty list of [`Step`]s. Flows are
//! immutable and hold no per-conversation state; everything a step needs to
//! remember between turns goes into [`Memory`].

use crate::config::ConfigError;
use crate::memory::Memory;
use crate::message::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a step or keyword action. Fails the whole turn.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("External call failed: {0}")]
    External(String),
    #[error("Step misconfigured: {0}")]
    Misconfigured(String),
}

/// Outcome of a step's completion predicate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub done: bool,
    /// Sent to the user when the step completes
    pub response: Option<String>,
}

impl Completion {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn done() -> Self {
        Self {
            done: true,
            response: None,
        }
    }

    pub fn done_with(response: impl Into<String>) -> Self {
        Self {
            done: true,
            response: Some(response.into()),
        }
    }
}

/// One unit of a flow
pub trait Step: Send + Sync {
    /// Prompt shown once, the first time the step becomes current
    fn on_entry(&self, msg: &Message, memory: &Memory) -> Result<String, StepError>;

    /// Runs on every later turn while the step is current
    fn on_input(&self, msg: &Message, memory: &mut Memory) -> Result<(), StepError>;

    /// Whether the step is finished
    fn complete(&self, memory: &Memory) -> Result<Completion, StepError>;

    /// Pass over the step without prompting when it is already complete
    fn skip_if_complete(&self) -> bool {
        false
    }

    /// Working keys removed when the flow ends or is reset
    fn scratch_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

type EntryFn = dyn Fn(&Message, &Memory) -> Result<String, StepError> + Send + Sync;
type InputFn = dyn Fn(&Message, &mut Memory) -> Result<(), StepError> + Send + Sync;
type CompleteFn = dyn Fn(&Memory) -> Result<Completion, StepError> + Send + Sync;

/// A step assembled from closures.
///
/// Input defaults to a no-op and completion to "always done".
#[allow(dead_code)] // Ad-hoc steps; the bundled plugin only uses task steps
pub struct FnStep {
    entry: Box<EntryFn>,
    input: Box<InputFn>,
    complete: Box<CompleteFn>,
    skip_if_complete: bool,
}

#[allow(dead_code)]
impl FnStep {
    pub fn new<F>(entry: F) -> Self
    where
        F: Fn(&Message, &Memory) -> Result<String, StepError> + Send + Sync + 'static,
    {
        Self {
            entry: Box::new(entry),
            input: Box::new(|_: &Message, _: &mut Memory| -> Result<(), StepError> { Ok(()) }),
            complete: Box::new(|_: &Memory| -> Result<Completion, StepError> {
                Ok(Completion::done())
            }),
            skip_if_complete: false,
        }
    }

    /// A step whose entry is a fixed prompt
    pub fn prompt(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_, _| Ok(text.clone()))
    }

    pub fn with_input<F>(mut self, input: F) -> Self
    where
        F: Fn(&Message, &mut Memory) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.input = Box::new(input);
        self
    }

    pub fn with_completion<F>(mut self, complete: F) -> Self
    where
        F: Fn(&Memory) -> Result<Completion, StepError> + Send + Sync + 'static,
    {
        self.complete = Box::new(complete);
        self
    }

    pub fn skippable(mut self) -> Self {
        self.skip_if_complete = true;
        self
    }
}

impl Step for FnStep {
    fn on_entry(&self, msg: &Message, memory: &Memory) -> Result<String, StepError> {
        (self.entry)(msg, memory)
    }

    fn on_input(&self, msg: &Message, memory: &mut Memory) -> Result<(), StepError> {
        (self.input)(msg, memory)
    }

    fn complete(&self, memory: &Memory) -> Result<Completion, StepError> {
        (self.complete)(memory)
    }

    fn skip_if_complete(&self) -> bool {
        self.skip_if_complete
    }
}

/// A named sequence of steps
#[derive(Clone)]
pub struct Flow {
    selector: String,
    steps: Arc<[Arc<dyn Step>]>,
    scratch_keys: Vec<String>,
}

impl Flow {
    pub fn new(selector: impl Into<String>, steps: Vec<Arc<dyn Step>>) -> Result<Self, ConfigError> {
        let selector = selector.into();
        if selector.trim().is_empty() {
            return Err(ConfigError::BlankSelector);
        }
        if steps.is_empty() {
            return Err(ConfigError::EmptyFlow(selector));
        }
        let mut scratch_keys: Vec<String> = steps.iter().flat_map(|s| s.scratch_keys()).collect();
        scratch_keys.sort();
        scratch_keys.dedup();
        Ok(Self {
            selector,
            steps: steps.into(),
            scratch_keys,
        })
    }

    /// Declare extra working keys to clear when the flow ends
    #[allow(dead_code)] // API completeness
    pub fn with_scratch_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.scratch_keys.extend(keys.into_iter().map(Into::into));
        self.scratch_keys.sort();
        self.scratch_keys.dedup();
        self
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[allow(dead_code)] // API completeness
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&Arc<dyn Step>> {
        self.steps.get(index)
    }

    pub fn scratch_keys(&self) -> &[String] {
        &self.scratch_keys
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("selector", &self.selector)
            .field("steps", &self.steps.len())
            .field("scratch_keys", &self.scratch_keys)
            .finish()
    }
}

/// Flows a plugin can run, by selector. Fixed after startup.
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    flows: HashMap<String, Flow>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, flow: Flow) -> Result<(), ConfigError> {
        if self.flows.contains_key(flow.selector()) {
            return Err(ConfigError::DuplicateFlow(flow.selector().to_string()));
        }
        self.flows.insert(flow.selector().to_string(), flow);
        Ok(())
    }

    pub fn with(mut self, flow: Flow) -> Result<Self, ConfigError> {
        self.register(flow)?;
        Ok(self)
    }

    pub fn get(&self, selector: &str) -> Option<&Flow> {
        self.flows.get(selector)
    }

    pub fn selectors(&self) -> Vec<&str> {
        let mut selectors: Vec<&str> = self.flows.keys().map(String::as_str).collect();
        selectors.sort_unstable();
        selectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ConversationId, Snapshot};

    struct Scratchy;

    impl Step for Scratchy {
        fn on_entry(&self, _: &Message, _: &Memory) -> Result<String, StepError> {
            Ok("hi".to_string())
        }

        fn on_input(&self, _: &Message, _: &mut Memory) -> Result<(), StepError> {
            Ok(())
        }

        fn complete(&self, _: &Memory) -> Result<Completion, StepError> {
            Ok(Completion::pending())
        }

        fn scratch_keys(&self) -> Vec<String> {
            vec!["b".to_string(), "a".to_string()]
        }
    }

    #[test]
    fn test_empty_flow_is_rejected() {
        let err = Flow::new("nothing", vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyFlow(ref s) if s == "nothing"));
    }

    #[test]
    fn test_blank_selector_is_rejected() {
        let err = Flow::new("  ", vec![Arc::new(FnStep::prompt("x")) as Arc<dyn Step>]).unwrap_err();
        assert!(matches!(err, ConfigError::BlankSelector));
    }

    #[test]
    fn test_scratch_keys_are_collected_from_steps() {
        let flow = Flow::new("f", vec![Arc::new(Scratchy) as Arc<dyn Step>, Arc::new(Scratchy) as Arc<dyn Step>])
            .unwrap()
            .with_scratch_keys(["c", "a"]);
        assert_eq!(flow.scratch_keys(), ["a", "b", "c"]);
    }

    #[test]
    fn test_fn_step_defaults() {
        let step = FnStep::prompt("hello");
        let conv = ConversationId::new("p", "u");
        let msg = Message::new(conv.clone(), "anything", vec![]);
        let mut memory = Memory::new(conv, Snapshot::new());

        assert_eq!(step.on_entry(&msg, &memory).unwrap(), "hello");
        step.on_input(&msg, &mut memory).unwrap();
        assert!(!memory.is_dirty());
        assert_eq!(step.complete(&memory).unwrap(), Completion::done());
        assert!(!step.skip_if_complete());
    }

    #[test]
    fn test_fn_step_builders_feed_trait_calls() {
        let step = FnStep::prompt("name?")
            .with_input(|msg, memory| {
                memory.set("name", msg.text.as_str());
                Ok(())
            })
            .with_completion(|memory| {
                Ok(Completion {
                    done: memory.contains("name"),
                    response: None,
                })
            });
        let conv = ConversationId::new("p", "u");
        let mut memory = Memory::new(conv.clone(), Snapshot::new());

        assert_eq!(step.complete(&memory).unwrap(), Completion::pending());
        step.on_input(&Message::new(conv, "Ada", vec![]), &mut memory)
            .unwrap();
        assert_eq!(memory.get_str("name"), "Ada");
        assert!(step.complete(&memory).unwrap().done);
    }

    #[test]
    fn test_registry_rejects_duplicate_selector() {
        let flow = Flow::new("add_card", vec![Arc::new(FnStep::prompt("x")) as Arc<dyn Step>]).unwrap();
        let mut registry = FlowRegistry::new();
        registry.register(flow.clone()).unwrap();

        let err = registry.register(flow).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateFlow(ref s) if s == "add_card"));
        assert_eq!(registry.selectors(), vec!["add_card"]);
    }
}
