//! Canonical streaming model
//!
//! Every provider adapter translates its vendor wire chunks into
//! [`ChatStreamChunk`]; nothing above the adapters sees vendor formats.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::utils::cancel::{CancelHandle, make_cancellable_stream};

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Normal end of turn
    End,
    /// The model is waiting for tool results
    ToolUse,
    /// Output token limit reached
    MaxTokens,
    /// A configured stop sequence was produced
    StopSequence,
}

/// Vendor-neutral unit of a streamed chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamChunk {
    /// Incremental assistant text
    TextDelta { text: String },
    /// A tool invocation begins at `index`
    ToolCallStart {
        id: String,
        index: usize,
        name: String,
    },
    /// Raw partial JSON for the tool at `index`; not valid JSON on its own
    ToolCallArgumentFragment { index: usize, partial_json: String },
    /// Whole-object parameters for the tool at `index`
    ToolCallParametersComplete { index: usize, input: Value },
    /// Terminal signal for this provider turn
    StreamStop { reason: StopReason },
}

impl ChatStreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn tool_start(id: impl Into<String>, index: usize, name: impl Into<String>) -> Self {
        Self::ToolCallStart {
            id: id.into(),
            index,
            name: name.into(),
        }
    }

    pub fn fragment(index: usize, partial_json: impl Into<String>) -> Self {
        Self::ToolCallArgumentFragment {
            index,
            partial_json: partial_json.into(),
        }
    }

    pub fn stop(reason: StopReason) -> Self {
        Self::StreamStop { reason }
    }
}

/// Lazy, finite, single-consumer sequence of canonical chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatStreamChunk, LlmError>> + Send>>;

/// A provider stream together with the handle that releases it.
pub struct ChatStreamHandle {
    pub stream: ChatStream,
    pub cancel: CancelHandle,
}

impl ChatStreamHandle {
    /// Wrap a stream so that it can be cancelled.
    pub fn new(stream: ChatStream) -> Self {
        let (stream, cancel) = make_cancellable_stream(stream);
        Self { stream, cancel }
    }

    /// Stop consuming and drop the upstream connection.
    pub fn release(self) {
        self.cancel.cancel();
        drop(self.stream);
    }
}

impl std::fmt::Debug for ChatStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStreamHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
