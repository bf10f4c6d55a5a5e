//! HTTP request handlers

use super::types::{
    ConversationListResponse, ErrorResponse, MemoryResponse, SuccessResponse, TurnRequest,
    TurnResponse,
};
use super::AppState;
use crate::memory::{ConversationId, Memory};
use crate::message::{Message, TurnKind};
use crate::state_machine::MachineState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Turns
        .route("/api/plugins/:plugin/users/:user/turn", post(run_turn))
        .route("/api/plugins/:plugin/users/:user/reset", post(reset_conversation))
        // Inspection
        .route("/api/plugins/:plugin/users/:user/memory", get(get_memory))
        .route("/api/plugins/:plugin/users/:user/forget", post(forget_conversation))
        .route("/api/plugins/:plugin/conversations", get(list_conversations))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

/// Resolve path parameters to a conversation of the served plugin
fn conversation(state: &AppState, plugin: &str, user: &str) -> Result<ConversationId, AppError> {
    if plugin != state.runtime.plugin().name() {
        return Err(AppError::NotFound(format!("Unknown plugin: {plugin}")));
    }
    let user = user.trim();
    if user.is_empty() {
        return Err(AppError::BadRequest("User must not be blank".to_string()));
    }
    Ok(ConversationId::new(plugin, user))
}

// ============================================================
// Turns
// ============================================================

async fn run_turn(
    State(state): State<AppState>,
    Path((plugin, user)): Path<(String, String)>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let conversation = conversation(&state, &plugin, &user)?;

    let message = match req.tokens {
        Some(tokens) => Message::new(conversation, req.text, tokens),
        None => state.runtime.plugin().message(conversation.user, req.text),
    };
    let kind = if req.initial {
        TurnKind::Initial
    } else {
        TurnKind::FollowUp
    };
    let message = message.with_kind(kind).with_metadata(req.metadata);

    match state.runtime.send_turn(message).await {
        Ok(response) => Ok(Json(TurnResponse { response })),
        Err(e) => {
            tracing::debug!(plugin = %plugin, user = %user, error = %e, "Answering with apology");
            Err(AppError::Internal(state.apology.clone()))
        }
    }
}

async fn reset_conversation(
    State(state): State<AppState>,
    Path((plugin, user)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, AppError> {
    let conversation = conversation(&state, &plugin, &user)?;

    state
        .runtime
        .reset(&conversation)
        .await
        .map_err(|_| AppError::Internal(state.apology.clone()))?;

    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Inspection
// ============================================================

async fn get_memory(
    State(state): State<AppState>,
    Path((plugin, user)): Path<(String, String)>,
) -> Result<Json<MemoryResponse>, AppError> {
    let conversation = conversation(&state, &plugin, &user)?;

    let snapshot = state
        .db
        .load_memory(&conversation)
        .map_err(|e| internal(&state, "Loading memory failed", &e))?;
    let entries = state
        .db
        .list_memory(&conversation)
        .map_err(|e| internal(&state, "Listing memory failed", &e))?;

    Ok(Json(MemoryResponse {
        state: MachineState::from_memory(&Memory::new(conversation, snapshot)),
        entries,
    }))
}

async fn forget_conversation(
    State(state): State<AppState>,
    Path((plugin, user)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, AppError> {
    let conversation = conversation(&state, &plugin, &user)?;

    // Queued behind pending turns so none of them writes the memory back
    let removed = state
        .runtime
        .forget(&conversation)
        .await
        .map_err(|e| internal(&state, "Forget failed", &e))?;

    Ok(Json(SuccessResponse {
        success: removed > 0,
    }))
}

async fn list_conversations(
    State(state): State<AppState>,
    Path(plugin): Path<String>,
) -> Result<Json<ConversationListResponse>, AppError> {
    if plugin != state.runtime.plugin().name() {
        return Err(AppError::NotFound(format!("Unknown plugin: {plugin}")));
    }

    let conversations = state
        .db
        .list_conversations(&plugin)
        .map_err(|e| internal(&state, "Listing conversations failed", &e))?;

    Ok(Json(ConversationListResponse { conversations }))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("convflow ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

/// Log the failure and answer with the apology only
fn internal(state: &AppState, context: &str, error: &dyn std::fmt::Display) -> AppError {
    tracing::error!(error = %error, "{}", context);
    AppError::Internal(state.apology.clone())
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
