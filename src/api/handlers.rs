//! HTTP request handlers

use super::ndjson::ndjson_response;
use super::types::{
    ChatRequest, ConversationResponse, ErrorResponse, HealthResponse, SuccessResponse,
    WelcomeResponse,
};
use super::AppState;
use crate::store::StoreError;
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
        .route("/", get(welcome))
        .route("/health", get(health))
        // New conversation (or stateless)
        .route("/api/chat", post(chat_new))
        // Resume, inspect, dispose
        .route(
            "/api/chat/:conversation_id",
            post(chat_resume)
                .get(get_conversation)
                .delete(delete_conversation),
        )
        .with_state(state)
}

async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the Chat API",
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "Healthy" })
}

// ============================================================
// Chat
// ============================================================

fn validated_message(req: ChatRequest) -> Result<ChatRequest, AppError> {
    if req.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".to_string()));
    }
    Ok(req)
}

async fn chat_new(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let req = validated_message(req)?;
    let events = state.chat.start(None, req.message, req.stateless).await?;
    Ok(ndjson_response(events))
}

async fn chat_resume(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let req = validated_message(req)?;
    if req.stateless {
        return Err(AppError::BadRequest(
            "Stateless requests cannot resume a conversation".to_string(),
        ));
    }
    let events = state
        .chat
        .start(Some(&conversation_id), req.message, false)
        .await?;
    Ok(ndjson_response(events))
}

// ============================================================
// Conversation lifecycle
// ============================================================

async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationResponse>, AppError> {
    let messages = state.chat.store().snapshot(&conversation_id).await?;
    Ok(Json(ConversationResponse {
        conversation_id,
        messages,
    }))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.chat.store().dispose(&conversation_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            StoreError::Io(_) => {
                tracing::error!(error = %err, "Conversation store failure");
                AppError::Internal(err.to_string())
            }
        }
    }
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
