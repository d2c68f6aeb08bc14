//! Line-oriented stream decoder for the chat completions API.
//!
//! Turns the raw response body into a lazy sequence of [`Delta`]s. Lines are
//! reassembled independently of network chunk boundaries, only `data:` lines
//! are considered, and the `[DONE]` sentinel ends the sequence immediately.
//! Lines that fail to decode are skipped: keep-alives and partial garbage
//! must not abort an otherwise healthy stream.

use super::{Delta, LlmError};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

/// Lazy, finite, non-restartable sequence of deltas
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, LlmError>> + Send>>;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Longest unterminated line we are willing to buffer
const MAX_LINE: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// What a single text line contributes to the stream
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    /// Not a data line, empty, or undecodable
    Skip,
    /// Termination sentinel
    Done,
    Deltas(Vec<Delta>),
}

/// Decode one complete line (without its terminator)
pub(crate) fn decode_line(line: &str) -> LineOutcome {
    let line = line.trim_end_matches('\r');
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Skip;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim() == DONE_SENTINEL {
        return LineOutcome::Done;
    }
    if payload.trim().is_empty() {
        return LineOutcome::Skip;
    }

    let chunk: StreamChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::warn!(error = %e, line = %payload, "Skipping undecodable stream line");
            return LineOutcome::Skip;
        }
    };

    let Some(choice) = chunk.choices.into_iter().next() else {
        return LineOutcome::Deltas(Vec::new());
    };

    let mut deltas = Vec::new();
    if let Some(text) = choice.delta.content {
        deltas.push(Delta::Content(text));
    }
    if let Some(call) = choice.delta.function_call {
        deltas.push(Delta::FunctionCall {
            name: call.name,
            arguments: call.arguments,
        });
    }
    LineOutcome::Deltas(deltas)
}

/// Reassembles text lines from arbitrarily split byte chunks.
///
/// Splitting happens on the `\n` byte, which never occurs inside a multi-byte
/// UTF-8 sequence, so a complete line is always whole text.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, LlmError> {
        let mut lines = Vec::new();
        for piece in chunk.split_inclusive(|b| *b == b'\n') {
            if piece.last() == Some(&b'\n') {
                self.pending.extend_from_slice(&piece[..piece.len() - 1]);
                let line = std::mem::take(&mut self.pending);
                lines.push(String::from_utf8_lossy(&line).into_owned());
            } else {
                self.pending.extend_from_slice(piece);
            }
        }

        if self.pending.len() > MAX_LINE {
            self.pending.clear();
            return Err(LlmError::protocol(format!(
                "Stream line exceeded {MAX_LINE} bytes"
            )));
        }
        Ok(lines)
    }

    /// Whatever remains once the body has closed
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

struct DecoderState<S> {
    body: Pin<Box<S>>,
    lines: LineBuffer,
    pending: VecDeque<Delta>,
    finished: bool,
    read_timeout: Option<Duration>,
}

impl<S> DecoderState<S> {
    /// Feed decoded lines; returns false once the sentinel was seen
    fn absorb(&mut self, lines: Vec<String>) -> bool {
        for line in lines {
            match decode_line(&line) {
                LineOutcome::Skip => {}
                LineOutcome::Done => return false,
                LineOutcome::Deltas(deltas) => self.pending.extend(deltas),
            }
        }
        true
    }
}

/// Decode a response body into a [`DeltaStream`].
///
/// Every individual read is bounded by `read_timeout` when given. Read errors
/// and timeouts are yielded once, after which the stream ends.
pub fn decode_stream<S, B, E>(body: S, read_timeout: Option<Duration>) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecoderState {
        body: Box::pin(body),
        lines: LineBuffer::default(),
        pending: VecDeque::new(),
        finished: false,
        read_timeout,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.pending.pop_front() {
                return Some((Ok(delta), state));
            }
            if state.finished {
                return None;
            }

            let next = match state.read_timeout {
                Some(limit) => {
                    let waited = tokio::time::timeout(limit, state.body.next()).await;
                    if let Ok(next) = waited {
                        next
                    } else {
                        state.finished = true;
                        let err = LlmError::timeout(format!(
                            "No data from upstream within {}s",
                            limit.as_secs()
                        ));
                        return Some((Err(err), state));
                    }
                }
                None => state.body.next().await,
            };

            match next {
                Some(Ok(chunk)) => {
                    let lines = match state.lines.push(chunk.as_ref()) {
                        Ok(lines) => lines,
                        Err(e) => {
                            state.finished = true;
                            return Some((Err(e), state));
                        }
                    };
                    if !state.absorb(lines) {
                        state.finished = true;
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let err = LlmError::network(format!("Stream read error: {e}"));
                    return Some((Err(err), state));
                }
                None => {
                    if let Some(line) = state.lines.finish() {
                        state.absorb(vec![line]);
                    }
                    state.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}
