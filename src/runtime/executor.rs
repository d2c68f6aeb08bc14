//! Turn orchestrator
//!
//! Drives one request: streams the dialogue upstream, forwards content as it
//! arrives, assembles and dispatches function calls, appends their results and
//! decides whether another turn is warranted.

use super::assembler::ArgumentAssembler;
use super::traits::FunctionExecutor;
use super::ChatEvent;
use crate::config::{TurnSettings, UnknownFunctionPolicy};
use crate::functions::{DispatchError, STORAGE_DIR_PARAM};
use crate::llm::{ChatMessage, CompletionClient, Delta, DeltaStream, FunctionDefinition, LlmError};
use crate::store::Conversation;
use futures::StreamExt;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc;

/// How a request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model answered without calling a function
    Completed,
    /// The turn budget ran out
    Exhausted,
    /// An unknown function ended the request
    Aborted,
    /// The upstream transport failed
    Failed,
    /// The caller went away
    Cancelled,
}

/// Reason to stop before the loop finishes on its own
enum Halt {
    Cancelled,
    Failed(LlmError),
}

/// Per-request working state. Only committed to the conversation at the end.
struct RequestState {
    dialogue: Vec<ChatMessage>,
    response: String,
    /// Length of `response` produced by finished turns
    settled: usize,
}

impl RequestState {
    fn settle(&mut self) {
        self.settled = self.response.len();
    }
}

pub struct TurnOrchestrator<C, F>
where
    C: CompletionClient,
    F: FunctionExecutor,
{
    client: C,
    functions: F,
    settings: TurnSettings,
}

async fn emit(events: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> Result<(), Halt> {
    events.send(event).await.map_err(|_| Halt::Cancelled)
}

impl<C, F> TurnOrchestrator<C, F>
where
    C: CompletionClient,
    F: FunctionExecutor,
{
    pub fn new(client: C, functions: F, settings: TurnSettings) -> Self {
        Self {
            client,
            functions,
            settings,
        }
    }

    /// Run one user message through the turn loop, streaming events to `events`.
    ///
    /// The conversation is updated once, when the request ends. After a
    /// transport failure or cancellation only finished turns are kept.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        message: &str,
        events: &mpsc::Sender<ChatEvent>,
    ) -> RunOutcome {
        let start = Instant::now();
        let definitions = self.functions.definitions();

        let mut state = RequestState {
            dialogue: conversation.messages.clone(),
            response: String::new(),
            settled: 0,
        };
        state.dialogue.push(ChatMessage::user(message));

        let outcome = match self
            .drive(&mut state, &definitions, &conversation.storage_dir, events)
            .await
        {
            Ok(outcome) => outcome,
            Err(Halt::Cancelled) => {
                tracing::info!(conv_id = %conversation.id, "Caller disconnected, stopping");
                RunOutcome::Cancelled
            }
            Err(Halt::Failed(err)) => {
                tracing::error!(
                    conv_id = %conversation.id,
                    kind = ?err.kind,
                    error = %err,
                    "Upstream stream failed"
                );
                let _ = events
                    .send(ChatEvent::Error {
                        message: format!("Error communicating with the model: {err}"),
                    })
                    .await;
                RunOutcome::Failed
            }
        };

        let RequestState {
            dialogue,
            mut response,
            settled,
        } = state;

        conversation.messages = dialogue;
        match outcome {
            RunOutcome::Completed | RunOutcome::Exhausted | RunOutcome::Aborted => {
                conversation.messages.push(ChatMessage::assistant(response));
            }
            RunOutcome::Failed | RunOutcome::Cancelled => {
                response.truncate(settled);
                if !response.is_empty() {
                    conversation.messages.push(ChatMessage::assistant(response));
                }
            }
        }

        tracing::info!(
            conv_id = %conversation.id,
            outcome = ?outcome,
            history = conversation.messages.len(),
            duration_ms = %start.elapsed().as_millis(),
            "Request finished"
        );
        outcome
    }

    async fn drive(
        &self,
        state: &mut RequestState,
        definitions: &[FunctionDefinition],
        storage_dir: &Path,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<RunOutcome, Halt> {
        for turn in 1..=self.settings.max_turns {
            let mut assembler = ArgumentAssembler::new();
            self.stream_turn(state, definitions, &mut assembler, events)
                .await?;

            let Some(name) = assembler.name().map(str::to_string) else {
                tracing::debug!(turn, "Turn ended with content only");
                return Ok(RunOutcome::Completed);
            };

            if assembler.needs_more() {
                self.complete_arguments(&state.dialogue, definitions, &mut assembler, events)
                    .await?;
            }

            emit(events, ChatEvent::FunctionCall { name: name.clone() }).await?;

            let mut args = match assembler.finish() {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!(turn, function = %name, error = %e, raw = %assembler.text(), "Unusable function arguments");
                    emit(
                        events,
                        ChatEvent::Error {
                            message: format!("Error parsing arguments for {name}: {e}"),
                        },
                    )
                    .await?;
                    state.settle();
                    continue;
                }
            };

            if self.functions.declares(&name, STORAGE_DIR_PARAM) {
                args.insert(
                    STORAGE_DIR_PARAM.to_string(),
                    Value::String(storage_dir.to_string_lossy().into_owned()),
                );
            }

            let started = Instant::now();
            match self.functions.dispatch(&name, args).await {
                Ok(result) => {
                    tracing::info!(
                        turn,
                        function = %name,
                        duration_ms = %started.elapsed().as_millis(),
                        "Function call succeeded"
                    );
                    state
                        .dialogue
                        .push(ChatMessage::function_result(&name, result.clone()));
                    state.settle();
                    emit(events, ChatEvent::FunctionResponse { content: result }).await?;
                }
                Err(e) => {
                    tracing::warn!(turn, function = %name, error = %e, "Function call failed");
                    let unknown = matches!(e, DispatchError::UnknownFunction(_));
                    state.settle();
                    emit(
                        events,
                        ChatEvent::Error {
                            message: e.to_string(),
                        },
                    )
                    .await?;
                    if unknown && self.settings.unknown_function == UnknownFunctionPolicy::Abort {
                        return Ok(RunOutcome::Aborted);
                    }
                }
            }
        }

        tracing::warn!(
            max_turns = self.settings.max_turns,
            "Turn budget exhausted"
        );
        Ok(RunOutcome::Exhausted)
    }

    /// Open a stream, giving up if the caller disconnects first
    async fn open(
        &self,
        dialogue: &[ChatMessage],
        definitions: &[FunctionDefinition],
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<DeltaStream, Halt> {
        tokio::select! {
            biased;
            () = events.closed() => Err(Halt::Cancelled),
            opened = self.client.stream(dialogue, definitions) => opened.map_err(Halt::Failed),
        }
    }

    /// Next delta, or cancellation if the caller is gone
    async fn next_delta(
        stream: &mut DeltaStream,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<Option<Delta>, Halt> {
        tokio::select! {
            biased;
            () = events.closed() => Err(Halt::Cancelled),
            item = stream.next() => item.transpose().map_err(Halt::Failed),
        }
    }

    async fn stream_turn(
        &self,
        state: &mut RequestState,
        definitions: &[FunctionDefinition],
        assembler: &mut ArgumentAssembler,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<(), Halt> {
        let mut stream = self.open(&state.dialogue, definitions, events).await?;

        while let Some(delta) = Self::next_delta(&mut stream, events).await? {
            match delta {
                Delta::Content(text) => {
                    state.response.push_str(&text);
                    emit(events, ChatEvent::Content { text }).await?;
                }
                Delta::FunctionCall { name, arguments } => {
                    if let Some(name) = name {
                        assembler.push_name(&name);
                    }
                    if let Some(fragment) = arguments {
                        assembler.push_fragment(&fragment);
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-query the same dialogue for the rest of an unfinished argument text
    async fn complete_arguments(
        &self,
        dialogue: &[ChatMessage],
        definitions: &[FunctionDefinition],
        assembler: &mut ArgumentAssembler,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<(), Halt> {
        for attempt in 1..=self.settings.argument_retries {
            if !assembler.needs_more() {
                break;
            }
            tracing::debug!(attempt, received = assembler.text().len(), "Waiting for more argument fragments");

            let mut stream = self.open(dialogue, definitions, events).await?;
            while assembler.needs_more() {
                match Self::next_delta(&mut stream, events).await? {
                    None => break,
                    Some(Delta::FunctionCall {
                        arguments: Some(fragment),
                        ..
                    }) => assembler.push_fragment(&fragment),
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}
