//! Property-based tests for the stream decoder
//!
//! The decoded delta sequence must not depend on how the transport happened
//! to chunk the body, and undecodable lines must never change the output.

use super::stream::decode_stream;
use super::Delta;
use futures::StreamExt;
use proptest::prelude::*;
use std::convert::Infallible;

fn content_line(text: &str) -> String {
    let chunk = serde_json::json!({"choices": [{"delta": {"content": text}}]});
    format!("data: {chunk}\n")
}

fn arguments_line(fragment: &str) -> String {
    let chunk = serde_json::json!({"choices": [{"delta": {"function_call": {"arguments": fragment}}}]});
    format!("data: {chunk}\n")
}

fn decode_chunks(chunks: Vec<Vec<u8>>) -> Vec<Delta> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    runtime.block_on(async move {
        let items: Vec<Result<Vec<u8>, Infallible>> = chunks.into_iter().map(Ok).collect();
        decode_stream(futures::stream::iter(items), None)
            .map(Result::unwrap)
            .collect()
            .await
    })
}

/// Split `bytes` at the given (unsorted, possibly repeated) cut points
fn split_at_points(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(bytes[start..point].to_vec());
        start = point;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

fn arb_body() -> impl Strategy<Value = (String, Vec<Delta>)> {
    prop::collection::vec(
        prop_oneof![
            "[a-zA-Zé✓ {}\"\\\\,.:]{0,20}".prop_map(|t| (content_line(&t), Delta::content(t))),
            "[a-z0-9{}\":, ]{0,12}"
                .prop_map(|f| (arguments_line(&f), Delta::function_arguments(f))),
        ],
        0..12,
    )
    .prop_map(|lines| {
        let mut body = String::new();
        let mut expected = Vec::new();
        for (line, delta) in lines {
            body.push_str(&line);
            expected.push(delta);
        }
        body.push_str("data: [DONE]\n");
        (body, expected)
    })
}

proptest! {
    #[test]
    fn chunking_does_not_change_deltas(
        (body, expected) in arb_body(),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let chunks = split_at_points(body.as_bytes(), &cuts);
        prop_assert_eq!(decode_chunks(chunks), expected);
    }

    #[test]
    fn garbage_lines_are_invisible(
        (body, expected) in arb_body(),
        garbage in "[a-z{}\\[\\]:]{1,20}",
    ) {
        let noisy: String = body
            .lines()
            .flat_map(|line| [format!("data: {{{garbage}\n"), format!("{line}\n")])
            .collect();
        prop_assert_eq!(decode_chunks(vec![noisy.into_bytes()]), expected);
    }

    #[test]
    fn trailing_data_after_sentinel_is_ignored(
        (body, expected) in arb_body(),
        tail in "[a-z ]{1,10}",
    ) {
        let with_tail = format!("{body}{}", content_line(&tail));
        prop_assert_eq!(decode_chunks(vec![with_tail.into_bytes()]), expected);
    }
}
