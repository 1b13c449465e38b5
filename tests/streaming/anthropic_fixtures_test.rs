//! Anthropic streaming fixtures tests

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use toolrelay::LlmError;
use toolrelay::providers::anthropic::AnthropicEventConverter;
use toolrelay::types::{ChatStreamChunk, StopReason};
use toolrelay::utils::streaming::SseEventConverter;

use crate::support;

fn text_of(chunks: &[ChatStreamChunk]) -> String {
    chunks
        .iter()
        .filter_map(|c| match c {
            ChatStreamChunk::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn stops(chunks: &[ChatStreamChunk]) -> Vec<StopReason> {
    chunks
        .iter()
        .filter_map(|c| match c {
            ChatStreamChunk::StreamStop { reason } => Some(*reason),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn anthropic_text_only_fixture() {
    let bytes = support::load_sse_fixture_as_bytes("anthropic/text_only.sse").expect("load fixture");
    let chunks = support::collect_chunks(bytes, AnthropicEventConverter::new()).await;

    assert_eq!(text_of(&chunks), "Hello world");
    assert_eq!(stops(&chunks), vec![StopReason::End]);
    assert!(
        !chunks
            .iter()
            .any(|c| matches!(c, ChatStreamChunk::ToolCallStart { .. }))
    );
}

#[tokio::test]
async fn anthropic_tool_use_fragments_fixture() {
    let bytes =
        support::load_sse_fixture_as_bytes("anthropic/tool_use_fragments.sse").expect("load fixture");
    let chunks = support::collect_chunks(bytes, AnthropicEventConverter::new()).await;

    assert_eq!(text_of(&chunks), "Let me click that.");

    let start = chunks
        .iter()
        .position(|c| matches!(c, ChatStreamChunk::ToolCallStart { .. }))
        .expect("tool call announced");
    assert_eq!(
        chunks[start],
        ChatStreamChunk::tool_start("toolu_01A", 1, "click_element")
    );

    // The empty leading fragment is dropped; the rest arrive after the start
    let fragments: Vec<(usize, &str)> = chunks
        .iter()
        .enumerate()
        .filter_map(|(pos, c)| match c {
            ChatStreamChunk::ToolCallArgumentFragment {
                index,
                partial_json,
            } => {
                assert!(pos > start);
                Some((*index, partial_json.as_str()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(fragments, vec![(1, "{\"selector\": \"#su"), (1, "bmit\"}")]);

    let joined: String = fragments.iter().map(|(_, f)| *f).collect();
    let input: serde_json::Value = serde_json::from_str(&joined).unwrap();
    assert_eq!(input["selector"], "#submit");

    // message_stop after the tool_use stop reason adds nothing
    assert_eq!(stops(&chunks), vec![StopReason::ToolUse]);
}

#[tokio::test]
async fn anthropic_parameterless_tool_fixture() {
    let bytes =
        support::load_sse_fixture_as_bytes("anthropic/parameterless_tool.sse").expect("load fixture");
    let chunks = support::collect_chunks(bytes, AnthropicEventConverter::new()).await;

    assert_eq!(
        chunks,
        vec![
            ChatStreamChunk::tool_start("toolu_02B", 0, "get_ui_state"),
            ChatStreamChunk::stop(StopReason::ToolUse),
        ]
    );
}

#[tokio::test]
async fn anthropic_error_event_fixture() {
    let bytes = support::load_sse_fixture_as_bytes("anthropic/error_event.sse").expect("load fixture");
    let converter = AnthropicEventConverter::new();
    let mut events = futures_util::stream::iter(bytes).eventsource();

    let mut errors = Vec::new();
    while let Some(event) = events.next().await {
        for item in converter.convert_event(event.expect("valid SSE event")).await {
            if let Err(e) = item {
                errors.push(e);
            }
        }
    }

    match errors.as_slice() {
        [LlmError::ApiError { message, .. }] => assert!(message.contains("Overloaded")),
        other => panic!("expected one API error, got {other:?}"),
    }
}
