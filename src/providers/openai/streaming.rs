//! OpenAI streaming implementation using eventsource-stream
//!
//! Chat Completions streams tool calls as `delta.tool_calls[]` entries
//! addressed by `index`. The id and name usually come with the first entry
//! for an index but compatible servers differ, so argument text that arrives
//! before the name is held back until the call can be announced. Completion is
//! signalled by `finish_reason`, which this converter turns into a
//! `StreamStop` chunk.

use std::collections::BTreeMap;

use eventsource_stream::Event;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::LlmError;
use crate::types::{ChatStreamChunk, StopReason};
use crate::utils::streaming::{
    ChunkBuilder, SseEventConverter, SseEventFuture, extract_error_message,
};

#[derive(Debug, Deserialize)]
struct OpenAiStreamEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: Option<OpenAiStreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
    /// Pre-`tools` function calling; always a single call
    #[serde(default)]
    function_call: Option<OpenAiFunctionCallDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAiFunctionCallDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionCallDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct ToolSlot {
    id: Option<String>,
    name: Option<String>,
    started: bool,
    /// Arguments received before the name was known
    pending: String,
}

#[derive(Debug, Default)]
struct StreamState {
    slots: BTreeMap<usize, ToolSlot>,
    stop_emitted: bool,
}

impl StreamState {
    fn apply_tool_delta(
        &mut self,
        mut builder: ChunkBuilder,
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    ) -> ChunkBuilder {
        let slot = self.slots.entry(index).or_default();
        if slot.id.is_none() {
            slot.id = id.filter(|s| !s.is_empty());
        }
        if slot.name.is_none() {
            slot.name = name.filter(|s| !s.is_empty());
        }

        if !slot.started
            && let Some(name) = slot.name.clone()
        {
            let id = slot
                .id
                .get_or_insert_with(|| format!("call_{}", uuid::Uuid::new_v4().simple()))
                .clone();
            slot.started = true;
            builder = builder.add_tool_start(id, index, name);
            let pending = std::mem::take(&mut slot.pending);
            builder = builder.add_fragment(index, pending);
        }

        match arguments {
            Some(args) if slot.started => builder.add_fragment(index, args),
            Some(args) => {
                slot.pending.push_str(&args);
                builder
            }
            None => builder,
        }
    }

    fn any_started(&self) -> bool {
        self.slots.values().any(|s| s.started)
    }
}

pub(crate) fn parse_finish_reason(reason: &str) -> StopReason {
    match reason {
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        _ => StopReason::End,
    }
}

/// OpenAI event converter; one instance per stream
#[derive(Debug, Default)]
pub struct OpenAiEventConverter {
    state: Mutex<StreamState>,
}

impl OpenAiEventConverter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn convert_openai_event(
        &self,
        event: OpenAiStreamEvent,
    ) -> Vec<Result<ChatStreamChunk, LlmError>> {
        if let Some(error) = event.error {
            let message = extract_error_message(&serde_json::json!({ "error": error }))
                .unwrap_or_else(|| "Unknown error".to_string());
            return vec![Err(LlmError::ApiError {
                code: 0,
                message: format!("OpenAI API error: {message}"),
                details: Some(error),
            })];
        }
        if let Some(usage) = &event.usage {
            tracing::debug!(id = ?event.id, %usage, "openai usage");
        }

        let mut state = self.state.lock().await;
        let mut builder = ChunkBuilder::new();

        // Only the first choice is consumed; requests never ask for n > 1
        let Some(choice) = event.choices.into_iter().next() else {
            return vec![];
        };

        let delta = choice.delta.unwrap_or_default();
        if let Some(content) = delta.content {
            builder = builder.add_text(content);
        }
        if let Some(tool_calls) = delta.tool_calls {
            for (position, call) in tool_calls.into_iter().enumerate() {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                builder = state.apply_tool_delta(
                    builder,
                    call.index.unwrap_or(position),
                    call.id,
                    name,
                    arguments,
                );
            }
        }
        if let Some(function_call) = delta.function_call {
            builder = state.apply_tool_delta(
                builder,
                0,
                None,
                function_call.name,
                function_call.arguments,
            );
        }

        if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty())
            && !state.stop_emitted
        {
            let mut stop = parse_finish_reason(&reason);
            if stop == StopReason::End && state.any_started() {
                // Some compatible servers report "stop" after emitting tool calls
                tracing::debug!(%reason, "treating finish reason as tool use");
                stop = StopReason::ToolUse;
            }
            for (index, slot) in &state.slots {
                if !slot.started {
                    tracing::warn!(index, "tool call never received a name; dropping it");
                }
            }
            state.stop_emitted = true;
            builder = builder.add_stop(stop);
        }

        builder.build_results()
    }
}

impl SseEventConverter for OpenAiEventConverter {
    fn convert_event(&self, event: Event) -> SseEventFuture<'_> {
        Box::pin(async move {
            tracing::debug!("OpenAI SSE event: {}", event.data);

            match serde_json::from_str::<OpenAiStreamEvent>(&event.data) {
                Ok(openai_event) => self.convert_openai_event(openai_event).await,
                Err(e) => vec![Err(LlmError::ParseError(format!(
                    "Failed to parse OpenAI event: {e}"
                )))],
            }
        })
    }
}
