//! Completion service abstraction
//!
//! Streams chat completions from an upstream model as typed deltas.

mod error;
mod openai;
#[cfg(test)]
mod proptests;
mod stream;
mod types;

pub use error::LlmError;
#[cfg(test)]
pub use error::LlmErrorKind;
pub use openai::{OpenAiClient, UpstreamConfig};
pub use stream::DeltaStream;
pub use types::*;

use async_trait::async_trait;

/// Common interface for streaming completion providers
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open a completion stream for the given dialogue.
    ///
    /// Each call opens a fresh upstream connection; the returned stream is
    /// not restartable.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionDefinition],
    ) -> Result<DeltaStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}
