//! toolchat - streaming tool-augmented chat server
//!
//! Relays a conversation with an `OpenAI`-compatible completion service,
//! executes the functions the model calls and streams everything back to the
//! caller as newline-delimited JSON.

mod api;
mod config;
mod functions;
mod llm;
mod runtime;
mod store;
mod system_prompt;

use api::{create_router, AppState};
use config::Config;
use functions::FunctionRegistry;
use llm::{CompletionClient, OpenAiClient};
use runtime::{ChatService, FunctionExecutor};
use std::net::SocketAddr;
use std::sync::Arc;
use store::ConversationStore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolchat=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Upstream completion service
    if config.upstream.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; chat requests will fail until it is configured");
    }
    let client: Arc<dyn CompletionClient> = Arc::new(OpenAiClient::new(&config.upstream)?);
    tracing::info!(
        model = %client.model_id(),
        base_url = %config.upstream.base_url,
        "Completion client initialized"
    );

    let registry = FunctionRegistry::standard(config.brave_api_key.clone());
    tracing::info!(
        functions = ?registry.definitions().iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
        "Function registry initialized"
    );
    let functions: Arc<dyn FunctionExecutor> = Arc::new(registry);

    // Conversation storage
    std::fs::create_dir_all(&config.storage_root)?;
    let store = Arc::new(ConversationStore::new(
        config.storage_root.clone(),
        config.system_prompt.clone(),
    ));
    tracing::info!(path = %store.storage_root().display(), "Conversation storage ready");

    if let Some(ttl) = config.session_ttl {
        store.spawn_sweeper(ttl);
        tracing::info!(ttl_secs = ttl.as_secs(), "Idle conversation expiry enabled");
    }

    let chat = ChatService::new(store, client, functions, config.turns.clone());
    let state = AppState::new(chat);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("toolchat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
