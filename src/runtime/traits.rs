//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the orchestrator with mock implementations.

use crate::functions::{Arguments, DispatchError, FunctionRegistry};
use crate::llm::{ChatMessage, CompletionClient, DeltaStream, FunctionDefinition, LlmError};
use async_trait::async_trait;
use std::sync::Arc;

/// Executor for model-initiated function calls
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    /// Get function definitions for the model
    fn definitions(&self) -> Vec<FunctionDefinition>;

    /// Whether function `name` exists and accepts parameter `param`
    fn declares(&self, name: &str, param: &str) -> bool;

    /// Invoke a function by name
    async fn dispatch(&self, name: &str, args: Arguments) -> Result<String, DispatchError>;
}

#[async_trait]
impl FunctionExecutor for FunctionRegistry {
    fn definitions(&self) -> Vec<FunctionDefinition> {
        FunctionRegistry::definitions(self)
    }

    fn declares(&self, name: &str, param: &str) -> bool {
        FunctionRegistry::declares(self, name, param)
    }

    async fn dispatch(&self, name: &str, args: Arguments) -> Result<String, DispatchError> {
        FunctionRegistry::dispatch(self, name, args).await
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Arc<T> {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        functions: &[FunctionDefinition],
    ) -> Result<DeltaStream, LlmError> {
        (**self).stream(messages, functions).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: FunctionExecutor + ?Sized> FunctionExecutor for Arc<T> {
    fn definitions(&self) -> Vec<FunctionDefinition> {
        (**self).definitions()
    }

    fn declares(&self, name: &str, param: &str) -> bool {
        (**self).declares(name, param)
    }

    async fn dispatch(&self, name: &str, args: Arguments) -> Result<String, DispatchError> {
        (**self).dispatch(name, args).await
    }
}
