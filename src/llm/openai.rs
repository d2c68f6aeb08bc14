//! `OpenAI`-compatible chat completions client (streaming, legacy `functions` API)

use super::stream::{decode_stream, DeltaStream};
use super::types::{ChatMessage, FunctionDefinition};
use super::{CompletionClient, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the upstream completion service
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_key: Option<String>,
    /// Base URL up to and including the version segment, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub model: String,
    /// Bound on connecting, receiving headers, and each body read
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<&'a [FunctionDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<&'static str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Streaming client for the chat completions endpoint
pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            timeout: config.timeout,
        })
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        functions: &'a [FunctionDefinition],
    ) -> ChatCompletionRequest<'a> {
        let (functions, function_call) = if functions.is_empty() {
            (None, None)
        } else {
            (Some(functions), Some("auto"))
        };

        ChatCompletionRequest {
            model: &self.model,
            messages,
            functions,
            function_call,
            stream: true,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionDefinition],
    ) -> Result<DeltaStream, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::auth("OPENAI_API_KEY is not configured"))?;

        let body = self.build_request(messages, functions);
        let start = std::time::Instant::now();

        let send = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| {
                LlmError::timeout(format!(
                    "Upstream did not respond within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map_or(text, |resp| resp.error.message);
            let err = LlmError::from_status(status.as_u16(), &message);
            tracing::error!(
                model = %self.model,
                status = status.as_u16(),
                retryable = err.kind.is_retryable(),
                error = %err,
                "Completion request rejected"
            );
            return Err(err);
        }

        tracing::info!(
            model = %self.model,
            messages = messages.len(),
            functions = functions.len(),
            duration_ms = %start.elapsed().as_millis(),
            "Completion stream opened"
        );

        Ok(decode_stream(response.bytes_stream(), Some(self.timeout)))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
