//! Anthropic streaming implementation using eventsource-stream
//!
//! Anthropic announces a tool call with one `content_block_start` carrying
//! the id and name, then streams the arguments as `input_json_delta` text
//! addressed by the same block index.

use std::collections::HashSet;

use eventsource_stream::Event;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::LlmError;
use crate::types::StopReason;
use crate::utils::streaming::{ChunkBuilder, SseEventConverter, SseEventFuture};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDelta,
        #[serde(default)]
        usage: Option<Value>,
    },
    MessageStop,
    Ping,
    Error {
        error: AnthropicErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

/// Delta subtypes; thinking and signature deltas fall into `Other`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default)]
struct StreamState {
    /// Block indexes that opened as `tool_use`
    tool_blocks: HashSet<usize>,
    stop_emitted: bool,
}

pub(crate) fn parse_stop_reason(reason: &str) -> StopReason {
    match reason {
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::End,
    }
}

/// Anthropic event converter; one instance per stream
#[derive(Debug, Default)]
pub struct AnthropicEventConverter {
    state: Mutex<StreamState>,
}

impl AnthropicEventConverter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn convert_anthropic_event(
        &self,
        event: AnthropicStreamEvent,
    ) -> Vec<Result<crate::types::ChatStreamChunk, LlmError>> {
        let mut state = self.state.lock().await;

        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                tracing::debug!(id = ?message.id, model = ?message.model, "anthropic message started");
                vec![]
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlock::Text { text } => ChunkBuilder::new().add_text(text).build_results(),
                ContentBlock::ToolUse { id, name, input } => {
                    state.tool_blocks.insert(index);
                    let mut builder = ChunkBuilder::new().add_tool_start(id, index, name);
                    if input.as_object().is_some_and(|o| !o.is_empty()) {
                        builder = builder.add_parameters(index, input);
                    }
                    builder.build_results()
                }
                ContentBlock::Other => vec![],
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    ChunkBuilder::new().add_text(text).build_results()
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if !state.tool_blocks.contains(&index) {
                        tracing::warn!(index, "input_json_delta for a block that is not a tool call");
                        return vec![];
                    }
                    ChunkBuilder::new()
                        .add_fragment(index, partial_json)
                        .build_results()
                }
                BlockDelta::Other => vec![],
            },
            AnthropicStreamEvent::ContentBlockStop { index } => {
                tracing::trace!(index, "content block closed");
                vec![]
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    tracing::debug!(%usage, "anthropic usage");
                }
                match delta.stop_reason {
                    Some(reason) if !state.stop_emitted => {
                        state.stop_emitted = true;
                        ChunkBuilder::new()
                            .add_stop(parse_stop_reason(&reason))
                            .build_results()
                    }
                    _ => vec![],
                }
            }
            AnthropicStreamEvent::MessageStop => {
                if state.stop_emitted {
                    vec![]
                } else {
                    state.stop_emitted = true;
                    ChunkBuilder::new().add_stop(StopReason::End).build_results()
                }
            }
            AnthropicStreamEvent::Ping | AnthropicStreamEvent::Unknown => vec![],
            AnthropicStreamEvent::Error { error } => {
                tracing::error!(error_type = ?error.error_type, message = %error.message, "anthropic stream error");
                vec![Err(LlmError::ApiError {
                    code: 0,
                    message: format!("Anthropic API error: {}", error.message),
                    details: error.error_type.map(Value::String),
                })]
            }
        }
    }
}

impl SseEventConverter for AnthropicEventConverter {
    fn convert_event(&self, event: Event) -> SseEventFuture<'_> {
        Box::pin(async move {
            tracing::debug!("Anthropic SSE event: {}", event.data);

            match serde_json::from_str::<AnthropicStreamEvent>(&event.data) {
                Ok(parsed) => self.convert_anthropic_event(parsed).await,
                Err(e) => {
                    tracing::warn!("Failed to parse Anthropic SSE event: {}", e);
                    vec![Err(LlmError::ParseError(format!(
                        "Failed to parse Anthropic event: {e}. Raw data: {}",
                        event.data
                    )))]
                }
            }
        })
    }
}
