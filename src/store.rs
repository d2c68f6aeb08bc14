//! Conversation state store
//!
//! Maps conversation identifiers to their message history and working storage.
//! Each conversation sits behind its own async mutex; a request holds that lock
//! for its whole duration, so requests against one identifier are serialized
//! while different identifiers proceed in parallel.

use crate::llm::ChatMessage;
use crate::system_prompt::seed_messages;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Upper bound on how long an expired conversation may linger
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    NotFound(String),
    #[error("Failed to provision conversation storage: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of the current time for idle tracking
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// One conversation's history and working storage
#[derive(Debug)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub storage_dir: PathBuf,
    last_used: Instant,
    ephemeral: bool,
}

impl Conversation {
    /// Whether this conversation is discarded after a single request
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }
}

pub type ConversationHandle = Arc<Mutex<Conversation>>;

/// Outcome of resolving a request to a conversation
pub struct Resolved {
    pub id: String,
    pub handle: ConversationHandle,
    /// True when the conversation did not exist before this request
    pub created: bool,
}

pub struct ConversationStore {
    conversations: RwLock<HashMap<String, ConversationHandle>>,
    storage_root: PathBuf,
    system_prompt: Option<String>,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    pub fn new(storage_root: PathBuf, system_prompt: Option<String>) -> Self {
        Self::with_clock(storage_root, system_prompt, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage_root: PathBuf,
        system_prompt: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            storage_root,
            system_prompt,
            clock,
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    async fn provision(&self, id: String, ephemeral: bool) -> Result<Conversation, StoreError> {
        let dir_name = if ephemeral {
            format!("ephemeral-{id}")
        } else {
            id.clone()
        };
        let storage_dir = self.storage_root.join(dir_name);
        tokio::fs::create_dir_all(&storage_dir).await?;

        Ok(Conversation {
            id,
            messages: seed_messages(self.system_prompt.as_deref()),
            storage_dir,
            last_used: self.clock.now(),
            ephemeral,
        })
    }

    /// Create and register a new conversation with a fresh identifier
    pub async fn create(&self) -> Result<Resolved, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let conversation = self.provision(id.clone(), false).await?;
        let handle = Arc::new(Mutex::new(conversation));

        self.conversations
            .write()
            .await
            .insert(id.clone(), handle.clone());

        tracing::info!(conv_id = %id, "Created conversation");
        Ok(Resolved {
            id,
            handle,
            created: true,
        })
    }

    /// Look up a registered conversation
    pub async fn get(&self, id: &str) -> Result<ConversationHandle, StoreError> {
        self.conversations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Resume `id` if given, otherwise create a new conversation.
    ///
    /// Unknown identifiers are rejected; caller-chosen ids are never adopted.
    pub async fn resolve(&self, id: Option<&str>) -> Result<Resolved, StoreError> {
        match id {
            Some(id) => Ok(Resolved {
                id: id.to_string(),
                handle: self.get(id).await?,
                created: false,
            }),
            None => self.create().await,
        }
    }

    /// Whether `handle` is still the conversation registered under `id`
    pub async fn is_registered(&self, id: &str, handle: &ConversationHandle) -> bool {
        self.conversations
            .read()
            .await
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Build an unregistered conversation for a single stateless request
    pub async fn ephemeral(&self) -> Result<Conversation, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.provision(id, true).await
    }

    /// Remove the storage of an ephemeral conversation
    pub async fn discard(&self, conversation: Conversation) {
        if !conversation.is_ephemeral() {
            tracing::warn!(conv_id = %conversation.id, "Refusing to discard a registered conversation");
            return;
        }
        remove_storage(&conversation.id, &conversation.storage_dir).await;
    }

    /// Record activity on a conversation for idle expiry
    pub fn touch(&self, conversation: &mut Conversation) {
        conversation.last_used = self.clock.now();
    }

    /// Copy of a conversation's history
    pub async fn snapshot(&self, id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let handle = self.get(id).await?;
        let conversation = handle.lock().await;
        Ok(conversation.messages.clone())
    }

    /// Destroy a conversation: history and the whole storage directory.
    ///
    /// Waits for any request holding the conversation to finish first.
    pub async fn dispose(&self, id: &str) -> Result<(), StoreError> {
        let handle = self
            .conversations
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let conversation = handle.lock().await;
        remove_storage(id, &conversation.storage_dir).await;
        tracing::info!(conv_id = %id, "Disposed conversation");
        Ok(())
    }

    /// Dispose every conversation idle for longer than `ttl`.
    ///
    /// Conversations currently locked by a request are skipped.
    pub async fn purge_expired(&self, ttl: Duration) -> usize {
        let now = self.clock.now();
        let mut expired = Vec::new();

        {
            let mut conversations = self.conversations.write().await;
            conversations.retain(|id, handle| {
                let Ok(conversation) = handle.try_lock() else {
                    return true;
                };
                if now.saturating_duration_since(conversation.last_used) > ttl {
                    expired.push((id.clone(), conversation.storage_dir.clone()));
                    false
                } else {
                    true
                }
            });
        }

        for (id, dir) in &expired {
            remove_storage(id, dir).await;
            tracing::info!(conv_id = %id, "Expired idle conversation");
        }
        expired.len()
    }

    /// Periodically purge idle conversations until the store is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, ttl: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let period = ttl.min(MAX_SWEEP_INTERVAL).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired(ttl).await;
                if purged > 0 {
                    tracing::debug!(purged, "Session sweep complete");
                }
            }
        })
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

async fn remove_storage(id: &str, dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(conv_id = %id, path = %dir.display(), error = %e, "Failed to remove conversation storage");
        }
    }
}
