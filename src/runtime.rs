//! Request runtime
//!
//! Resolves a request to its conversation, runs the turn orchestrator on its
//! own task and hands the caller a bounded channel of events.

mod assembler;
mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::TurnOrchestrator;
pub use traits::*;

use crate::config::TurnSettings;
use crate::llm::CompletionClient;
use crate::store::{ConversationStore, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Capacity of the channel between the orchestrator task and the response body
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events streamed back to the caller, in production order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Identifier of a newly created conversation; always first when present
    ConversationId { id: String },
    Content { text: String },
    FunctionCall { name: String },
    FunctionResponse { content: String },
    Error { message: String },
}

/// Production orchestrator with trait-object I/O
pub type ProductionOrchestrator =
    TurnOrchestrator<Arc<dyn CompletionClient>, Arc<dyn FunctionExecutor>>;

/// Entry point for chat requests
pub struct ChatService {
    store: Arc<ConversationStore>,
    orchestrator: Arc<ProductionOrchestrator>,
}

impl ChatService {
    pub fn new(
        store: Arc<ConversationStore>,
        client: Arc<dyn CompletionClient>,
        functions: Arc<dyn FunctionExecutor>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            store,
            orchestrator: Arc::new(TurnOrchestrator::new(client, functions, settings)),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Start processing `message` and return the event stream.
    ///
    /// Session errors surface here, before any event is produced.
    pub async fn start(
        &self,
        conversation_id: Option<&str>,
        message: String,
        stateless: bool,
    ) -> Result<mpsc::Receiver<ChatEvent>, StoreError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let orchestrator = self.orchestrator.clone();
        let store = self.store.clone();

        if stateless {
            let mut conversation = self.store.ephemeral().await?;
            let span = tracing::info_span!("chat", conv_id = %conversation.id, stateless = true);
            tokio::spawn(
                async move {
                    orchestrator.run(&mut conversation, &message, &tx).await;
                    store.discard(conversation).await;
                }
                .instrument(span),
            );
            return Ok(rx);
        }

        let resolved = self.store.resolve(conversation_id).await?;
        let span = tracing::info_span!("chat", conv_id = %resolved.id);
        tokio::spawn(
            async move {
                if resolved.created
                    && tx
                        .send(ChatEvent::ConversationId {
                            id: resolved.id.clone(),
                        })
                        .await
                        .is_err()
                {
                    return;
                }

                let mut conversation = resolved.handle.lock().await;
                // Disposed or expired between lookup and lock
                if !store.is_registered(&resolved.id, &resolved.handle).await {
                    tracing::warn!("Conversation removed before the request started");
                    let _ = tx
                        .send(ChatEvent::Error {
                            message: format!("Conversation not found: {}", resolved.id),
                        })
                        .await;
                    return;
                }
                orchestrator.run(&mut conversation, &message, &tx).await;
                store.touch(&mut conversation);
            }
            .instrument(span),
        );
        Ok(rx)
    }
}
