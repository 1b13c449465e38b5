//! OpenAI streaming fixtures tests

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use toolrelay::LlmError;
use toolrelay::providers::openai::OpenAiEventConverter;
use toolrelay::types::{ChatStreamChunk, StopReason};
use toolrelay::utils::streaming::SseEventConverter;

use crate::support;

#[tokio::test]
async fn openai_text_only_fixture() {
    let bytes = support::load_sse_fixture_as_bytes("openai/text_only.sse").expect("load fixture");
    let chunks = support::collect_chunks(bytes, OpenAiEventConverter::new()).await;

    assert_eq!(
        chunks,
        vec![
            ChatStreamChunk::text("Hello"),
            ChatStreamChunk::text(" world"),
            ChatStreamChunk::stop(StopReason::End),
        ]
    );
}

#[tokio::test]
async fn openai_tool_call_fragments_fixture() {
    let bytes =
        support::load_sse_fixture_as_bytes("openai/tool_call_fragments.sse").expect("load fixture");
    let chunks = support::collect_chunks(bytes, OpenAiEventConverter::new()).await;

    assert_eq!(
        chunks,
        vec![
            ChatStreamChunk::text("Let me click that."),
            ChatStreamChunk::tool_start("call_abc", 0, "click_element"),
            ChatStreamChunk::fragment(0, "{\"selector\": \"#su"),
            ChatStreamChunk::fragment(0, "bmit\"}"),
            ChatStreamChunk::stop(StopReason::ToolUse),
        ]
    );
}

#[tokio::test]
async fn openai_parallel_tool_calls_fixture() {
    let bytes =
        support::load_sse_fixture_as_bytes("openai/parallel_tool_calls.sse").expect("load fixture");
    let chunks = support::collect_chunks(bytes, OpenAiEventConverter::new()).await;

    assert_eq!(
        chunks,
        vec![
            ChatStreamChunk::tool_start("call_one", 0, "get_ui_state"),
            ChatStreamChunk::fragment(0, "{}"),
            ChatStreamChunk::tool_start("call_two", 1, "scroll"),
            ChatStreamChunk::fragment(1, "{\"dy\":"),
            ChatStreamChunk::fragment(1, " 200}"),
            ChatStreamChunk::stop(StopReason::ToolUse),
        ]
    );
}

#[tokio::test]
async fn openai_error_payload_fixture() {
    let bytes = support::load_sse_fixture_as_bytes("openai/error_payload.sse").expect("load fixture");
    let converter = OpenAiEventConverter::new();
    let mut events = futures_util::stream::iter(bytes).eventsource();

    let event = events.next().await.expect("one event").expect("valid SSE event");
    let items = converter.convert_event(event).await;
    match items.as_slice() {
        [Err(LlmError::ApiError { message, .. })] => {
            assert!(message.contains("server had an error"))
        }
        other => panic!("expected one API error, got {other:?}"),
    }
}
