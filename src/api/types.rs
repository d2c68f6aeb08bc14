//! API request and response types

use crate::llm::ChatMessage;
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Use a throwaway conversation that is discarded after this request
    #[serde(default)]
    pub stateless: bool,
}

/// Response for the root endpoint
#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: &'static str,
}

/// Response for the health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Conversation history snapshot
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
}

/// Generic success response
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
