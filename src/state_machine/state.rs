//! Conversation state as seen through the reserved memory keys

use crate::memory::{Memory, ENTERED_KEY, FLOW_KEY, STEP_KEY};
use serde::{Deserialize, Serialize};

/// Where a conversation stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MachineState {
    /// No active flow
    #[default]
    Idle,
    /// A flow is selected but the current step has not prompted yet
    Armed { flow: String, step: usize },
    /// The current step prompted and is waiting for input
    StepEntering { flow: String, step: usize },
}

impl MachineState {
    /// Read the state out of memory
    pub fn from_memory(memory: &Memory) -> Self {
        let Some(flow) = selector(memory) else {
            return MachineState::Idle;
        };
        let step = cursor(memory);
        if memory.get_bool(ENTERED_KEY) {
            MachineState::StepEntering { flow, step }
        } else {
            MachineState::Armed { flow, step }
        }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn is_idle(&self) -> bool {
        matches!(self, MachineState::Idle)
    }
}

/// The active flow selector, if any
pub fn selector(memory: &Memory) -> Option<String> {
    Some(memory.get_str(FLOW_KEY)).filter(|s| !s.is_empty())
}

/// The step cursor; negative values read as zero
pub fn cursor(memory: &Memory) -> usize {
    usize::try_from(memory.get_int(STEP_KEY)).unwrap_or(0)
}

/// Arm a flow for the conversation.
///
/// Switching to a different flow starts it from its first step. Re-selecting
/// the active flow keeps its progress.
pub fn select_flow(memory: &mut Memory, flow: &str) {
    if selector(memory).as_deref() == Some(flow) {
        return;
    }
    memory.set(FLOW_KEY, flow);
    memory.set(STEP_KEY, 0i64);
    memory.set(ENTERED_KEY, false);
}
