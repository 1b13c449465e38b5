//! Test fixtures utilities: load SSE streaming chunks and drive converters

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use toolrelay::types::ChatStreamChunk;
use toolrelay::utils::streaming::SseEventConverter;

/// Absolute path of a fixture under `tests/fixtures`
pub fn fixture_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

/// Raw fixture text, as a provider would send it
pub fn read_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative)).expect("read fixture text")
}

/// Load an `.sse` fixture file and split it into SSE data chunks (separated by blank lines), returning a byte stream
pub fn load_sse_fixture_as_bytes(relative: &str) -> io::Result<Vec<Result<Vec<u8>, io::Error>>> {
    let raw = std::fs::read_to_string(fixture_path(relative))?;
    // Normalize line endings
    let normalized = raw.replace("\r\n", "\n");
    let mut out = Vec::new();
    for chunk in normalized.split("\n\n") {
        let s = chunk.trim_end_matches('\n');
        if s.is_empty() {
            continue;
        }
        // Restore SSE event blank line terminator
        let mut owned = String::from(s);
        owned.push_str("\n\n");
        out.push(Ok(owned.into_bytes()));
    }
    Ok(out)
}

/// Collect the chunk sequence from a byte stream using the provided SSE event converter.
///
/// Stops at `[DONE]` like the real stream factory does.
pub async fn collect_chunks<C>(
    bytes: Vec<Result<Vec<u8>, io::Error>>,
    converter: C,
) -> Vec<ChatStreamChunk>
where
    C: SseEventConverter,
{
    let mut sse_stream = futures_util::stream::iter(bytes).eventsource();

    let mut chunks = Vec::new();
    while let Some(item) = sse_stream.next().await {
        let event = item.expect("valid SSE event");
        if event.data.trim() == "[DONE]" {
            break;
        }
        for chunk in converter.convert_event(event).await {
            chunks.push(chunk.expect("convert ok"));
        }
    }
    chunks
}
