//! Conversation state machine
//!
//! Progress through a flow lives entirely in memory under three reserved
//! keys: the flow selector, the step cursor, and the entered flag. Each turn
//! boots a [`StateMachine`] from memory, advances it, and commits.

pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use state::{select_flow, MachineState};
pub use transition::StateMachine;
