//! Step sequencing
//!
//! One [`StateMachine`] lives for one turn. It reads the reserved keys out of
//! the conversation's [`Memory`], runs the active flow forward, and stages the
//! new cursor. Nothing is persisted until [`StateMachine::commit`].

use super::state::{cursor, selector, select_flow, MachineState};
use crate::flow::{Flow, StepError};
use crate::memory::{ConversationId, Memory, StoreError, ENTERED_KEY, FLOW_KEY, STEP_KEY};
use crate::message::Message;
use crate::runtime::traits::MemoryStore;

/// Drives one flow for one conversation during a turn
#[derive(Debug)]
pub struct StateMachine {
    memory: Memory,
    flow: Option<Flow>,
}

impl StateMachine {
    /// Load persisted progress for a conversation
    pub async fn boot<S: MemoryStore + ?Sized>(
        store: &S,
        conversation: &ConversationId,
    ) -> Result<Self, StoreError> {
        Ok(Self::from_memory(Memory::load(store, conversation).await?))
    }

    pub fn from_memory(memory: Memory) -> Self {
        Self { memory, flow: None }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn state(&self) -> MachineState {
        MachineState::from_memory(&self.memory)
    }

    pub fn selector(&self) -> Option<String> {
        selector(&self.memory)
    }

    pub fn cursor(&self) -> usize {
        cursor(&self.memory)
    }

    pub fn entered(&self) -> bool {
        self.memory.get_bool(ENTERED_KEY)
    }

    #[allow(dead_code)] // Useful for tests
    pub fn flow(&self) -> Option<&Flow> {
        self.flow.as_ref()
    }

    /// Arm a flow by selector (see [`select_flow`])
    pub fn select(&mut self, flow: &str) {
        select_flow(&mut self.memory, flow);
    }

    /// Bind the flow to run this turn.
    ///
    /// When no flow is selected the given one becomes active. When a
    /// different flow is already selected it is left alone and `false` is
    /// returned.
    pub fn set_flow(&mut self, flow: Flow) -> bool {
        match self.selector() {
            Some(active) if active != flow.selector() => {
                tracing::debug!(
                    conv = %self.memory.conversation(),
                    active = %active,
                    offered = %flow.selector(),
                    "Flow already selected"
                );
                false
            }
            Some(_) => {
                self.flow = Some(flow);
                true
            }
            None => {
                self.select(flow.selector());
                self.flow = Some(flow);
                true
            }
        }
    }

    /// Make the current step prompt again on the next advance
    pub fn rewind_entry(&mut self) {
        if self.selector().is_some() && self.entered() {
            self.memory.set(ENTERED_KEY, false);
        }
    }

    /// Run the bound flow forward by one turn and return the response text.
    ///
    /// On error the staged memory may hold partial writes; callers must not
    /// commit it.
    pub fn advance(&mut self, msg: &Message) -> Result<String, StepError> {
        let Some(flow) = self.flow.clone() else {
            return Ok(String::new());
        };

        let mut step_index = self.cursor();
        if step_index >= flow.len() {
            tracing::warn!(
                conv = %self.memory.conversation(),
                flow = %flow.selector(),
                step = step_index,
                steps = flow.len(),
                "Cursor past end of flow, resetting"
            );
            self.reset();
            return Ok(String::new());
        }

        let mut carried: Option<String> = None;

        if self.entered() {
            let Some(step) = flow.step(step_index) else {
                return Ok(String::new());
            };
            tracing::debug!(
                conv = %self.memory.conversation(),
                flow = %flow.selector(),
                step = step_index,
                "Step advancing"
            );
            step.on_input(msg, &mut self.memory)?;
            let completion = step.complete(&self.memory)?;
            if !completion.done {
                return Ok(String::new());
            }
            carried = completion.response;
            step_index += 1;
        }

        // Each pass either prompts, finishes, or skips one step
        for _ in 0..=flow.len() {
            let Some(step) = flow.step(step_index) else {
                tracing::info!(
                    conv = %self.memory.conversation(),
                    flow = %flow.selector(),
                    "Flow complete"
                );
                self.finish(&flow);
                return Ok(carried.unwrap_or_default());
            };

            if step.skip_if_complete() {
                let completion = step.complete(&self.memory)?;
                if completion.done {
                    tracing::debug!(
                        conv = %self.memory.conversation(),
                        flow = %flow.selector(),
                        step = step_index,
                        "Skipping completed step"
                    );
                    carried = join(carried, completion.response);
                    step_index += 1;
                    continue;
                }
            }

            let prompt = step.on_entry(msg, &self.memory)?;
            self.memory.set(STEP_KEY, step_index);
            self.memory.set(ENTERED_KEY, true);
            tracing::debug!(
                conv = %self.memory.conversation(),
                flow = %flow.selector(),
                step = step_index,
                "Step entering"
            );
            return Ok(join(carried, Some(prompt)).unwrap_or_default());
        }

        self.finish(&flow);
        Ok(carried.unwrap_or_default())
    }

    /// Return to `Idle`, clearing the bound flow's scratch keys
    pub fn reset(&mut self) {
        self.memory.remove(FLOW_KEY);
        self.memory.remove(STEP_KEY);
        self.memory.remove(ENTERED_KEY);
        if let Some(flow) = self.flow.take() {
            self.clear_scratch(&flow);
        }
    }

    /// Remove a flow's working keys, e.g. when the user leaves it for another
    pub fn clear_scratch(&mut self, flow: &Flow) {
        for key in flow.scratch_keys() {
            self.memory.remove(key.as_str());
        }
    }

    fn finish(&mut self, flow: &Flow) {
        self.flow = Some(flow.clone());
        self.reset();
    }

    /// Persist everything staged this turn
    pub async fn commit<S: MemoryStore + ?Sized>(&mut self, store: &S) -> Result<usize, StoreError> {
        self.memory.commit(store).await
    }
}

fn join(first: Option<String>, second: Option<String>) -> Option<String> {
    match (first.filter(|s| !s.is_empty()), second.filter(|s| !s.is_empty())) {
        (Some(a), Some(b)) => Some(format!("{a}\n{b}")),
        (a, b) => a.or(b),
    }
}
