//! Newline-delimited JSON event streaming
//!
//! Each orchestrator event becomes one JSON object terminated by `\n`, in the
//! order the orchestrator produced them.

use crate::runtime::ChatEvent;
use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Encode one event as a single NDJSON line
pub fn encode_event(event: &ChatEvent) -> String {
    let value = match event {
        ChatEvent::ConversationId { id } => json!({
            "type": "conversation_id",
            "id": id
        }),
        ChatEvent::Content { text } => json!({
            "type": "content",
            "content": text
        }),
        ChatEvent::FunctionCall { name } => json!({
            "type": "function_call",
            "function": name
        }),
        ChatEvent::FunctionResponse { content } => json!({
            "type": "function_response",
            "content": content
        }),
        ChatEvent::Error { message } => json!({
            "type": "error",
            "content": message
        }),
    };

    let mut line = value.to_string();
    line.push('\n');
    line
}

/// Stream events to the caller as they arrive.
///
/// Dropping the response body drops the receiver, which the orchestrator
/// observes as a disconnect.
pub fn ndjson_response(events: mpsc::Receiver<ChatEvent>) -> Response {
    let lines = ReceiverStream::new(events).map(|event| Ok::<_, Infallible>(encode_event(&event)));

    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn decode(line: &str) -> Value {
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        serde_json::from_str(line.trim_end()).unwrap()
    }

    #[test]
    fn test_record_shapes() {
        assert_eq!(
            decode(&encode_event(&ChatEvent::ConversationId { id: "abc".into() })),
            json!({"type": "conversation_id", "id": "abc"})
        );
        assert_eq!(
            decode(&encode_event(&ChatEvent::Content { text: String::new() })),
            json!({"type": "content", "content": ""})
        );
        assert_eq!(
            decode(&encode_event(&ChatEvent::FunctionCall {
                name: "get_current_time".into()
            })),
            json!({"type": "function_call", "function": "get_current_time"})
        );
        assert_eq!(
            decode(&encode_event(&ChatEvent::FunctionResponse {
                content: "2024-05-01 12:00:00".into()
            })),
            json!({"type": "function_response", "content": "2024-05-01 12:00:00"})
        );
        assert_eq!(
            decode(&encode_event(&ChatEvent::Error {
                message: "boom".into()
            })),
            json!({"type": "error", "content": "boom"})
        );
    }

    #[test]
    fn test_embedded_newlines_stay_on_one_line() {
        let line = encode_event(&ChatEvent::Content {
            text: "line one\nline two".into(),
        });
        assert_eq!(decode(&line)["content"], "line one\nline two");
    }

    #[tokio::test]
    async fn test_response_preserves_order() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(ChatEvent::ConversationId { id: "c1".into() }).await.unwrap();
        tx.send(ChatEvent::Content { text: "a".into() }).await.unwrap();
        tx.send(ChatEvent::Content { text: "b".into() }).await.unwrap();
        drop(tx);

        let response = ndjson_response(rx);
        assert_eq!(response.headers()[header::CONTENT_TYPE], NDJSON_CONTENT_TYPE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let kinds: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(kinds.len(), 3);
        assert_eq!(kinds[0]["id"], "c1");
        assert_eq!(kinds[1]["content"], "a");
        assert_eq!(kinds[2]["content"], "b");
    }
}
