//! API request and response types

use crate::db::{ConversationSummary, MemoryRow};
use crate::message::Token;
use crate::state_machine::MachineState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request to run one turn
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
    /// Pre-tagged tokens; when absent the text is tagged against the
    /// plugin's trigger words
    #[serde(default)]
    pub tokens: Option<Vec<Token>>,
    /// The host routed a fresh request to this plugin
    #[serde(default)]
    pub initial: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Response for a turn; empty means nothing to say
#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub response: String,
}

/// Response with a conversation's stored memory
#[derive(Debug, Serialize)]
pub struct MemoryResponse {
    pub state: MachineState,
    pub entries: Vec<MemoryRow>,
}

/// Response with a list of conversations
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
