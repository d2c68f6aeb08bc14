//! Mock implementations for testing
//!
//! These mocks enable orchestrator and HTTP tests without real I/O.

use super::traits::FunctionExecutor;
use crate::functions::{Arguments, DispatchError, FunctionError};
use crate::llm::{ChatMessage, CompletionClient, Delta, DeltaStream, FunctionDefinition, LlmError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Completion Client
// ============================================================================

/// One scripted upstream response
#[derive(Debug, Clone)]
pub enum MockTurn {
    /// Stream these deltas, then close normally
    Deltas(Vec<Delta>),
    /// Stream these deltas, then fail with a transport error
    FailsAfter(Vec<Delta>, LlmError),
    /// Refuse to open the stream
    Rejected(LlmError),
    /// Stream these deltas, then never produce another item
    Stalls(Vec<Delta>),
}

impl MockTurn {
    /// Plain text answer split into the given fragments
    pub fn text(fragments: &[&str]) -> Self {
        Self::Deltas(fragments.iter().map(|f| Delta::content(*f)).collect())
    }

    /// A function call whose arguments arrive as the given fragments
    pub fn call(name: &str, fragments: &[&str]) -> Self {
        Self::Deltas(call_deltas(name, fragments))
    }
}

pub fn call_deltas(name: &str, fragments: &[&str]) -> Vec<Delta> {
    let mut deltas = vec![Delta::function_name(name)];
    deltas.extend(fragments.iter().map(|f| Delta::function_arguments(*f)));
    deltas
}

/// Mock completion client that replays scripted turns
pub struct MockCompletionClient {
    turns: Mutex<VecDeque<MockTurn>>,
    /// Replay this turn once the queue is empty
    repeat: Mutex<Option<MockTurn>>,
    /// Dialogue sent on every call
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            repeat: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_turns(turns: impl IntoIterator<Item = MockTurn>) -> Self {
        let client = Self::new();
        client.turns.lock().unwrap().extend(turns);
        client
    }

    /// Answer every call past the queue with `turn`
    pub fn repeating(self, turn: MockTurn) -> Self {
        *self.repeat.lock().unwrap() = Some(turn);
        self
    }

    pub fn recorded_requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

fn ok_items(deltas: Vec<Delta>) -> Vec<Result<Delta, LlmError>> {
    deltas.into_iter().map(Ok).collect()
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        _functions: &[FunctionDefinition],
    ) -> Result<DeltaStream, LlmError> {
        self.requests.lock().unwrap().push(messages.to_vec());

        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.lock().unwrap().clone())
            .ok_or_else(|| LlmError::network("No mock response queued"))?;

        match turn {
            MockTurn::Deltas(deltas) => Ok(Box::pin(stream::iter(ok_items(deltas)))),
            MockTurn::FailsAfter(deltas, err) => {
                let mut items = ok_items(deltas);
                items.push(Err(err));
                Ok(Box::pin(stream::iter(items)))
            }
            MockTurn::Rejected(err) => Err(err),
            MockTurn::Stalls(deltas) => Ok(Box::pin(
                stream::iter(ok_items(deltas)).chain(stream::pending()),
            )),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock Function Executor
// ============================================================================

struct MockFunction {
    accepted: Vec<String>,
    output: Result<String, String>,
}

/// Mock function executor with predefined outputs
pub struct MockFunctionExecutor {
    functions: HashMap<String, MockFunction>,
    delay: Option<Duration>,
    /// Record of dispatched calls
    pub calls: Mutex<Vec<(String, Arguments)>>,
    /// Notified when a dispatch starts
    pub dispatch_started: Arc<Notify>,
}

impl MockFunctionExecutor {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
            dispatch_started: Arc::new(Notify::new()),
        }
    }

    /// Add a function that succeeds with `output`
    pub fn with_function(mut self, name: &str, accepted: &[&str], output: &str) -> Self {
        self.functions.insert(
            name.to_string(),
            MockFunction {
                accepted: accepted.iter().map(|p| (*p).to_string()).collect(),
                output: Ok(output.to_string()),
            },
        );
        self
    }

    /// Add a function that always fails with `message`
    pub fn with_failing_function(mut self, name: &str, message: &str) -> Self {
        self.functions.insert(
            name.to_string(),
            MockFunction {
                accepted: Vec::new(),
                output: Err(message.to_string()),
            },
        );
        self
    }

    /// Make every dispatch take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn recorded_calls(&self) -> Vec<(String, Arguments)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockFunctionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FunctionExecutor for MockFunctionExecutor {
    fn definitions(&self) -> Vec<FunctionDefinition> {
        let mut names: Vec<_> = self.functions.keys().cloned().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| FunctionDefinition {
                description: format!("Mock {name}"),
                name,
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            })
            .collect()
    }

    fn declares(&self, name: &str, param: &str) -> bool {
        self.functions
            .get(name)
            .is_some_and(|f| f.accepted.iter().any(|p| p == param))
    }

    async fn dispatch(&self, name: &str, args: Arguments) -> Result<String, DispatchError> {
        self.calls.lock().unwrap().push((name.to_string(), args));
        self.dispatch_started.notify_one();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let function = self
            .functions
            .get(name)
            .ok_or_else(|| DispatchError::UnknownFunction(name.to_string()))?;

        function.output.clone().map_err(|message| DispatchError::Failed {
            name: name.to_string(),
            source: FunctionError::Upstream(message),
        })
    }
}
