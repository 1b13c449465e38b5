//! Provider adapters
//!
//! One adapter per vendor wire format. Each adapter owns two translations:
//! conversation → vendor request body (its [`RequestTransformer`]) and vendor
//! SSE events → [`ChatStreamChunk`](crate::types::ChatStreamChunk) (its
//! [`SseEventConverter`](crate::utils::streaming::SseEventConverter)).
//!
//! - [`anthropic`]: atomic-start style. A tool call opens with one block-start
//!   event and its arguments follow as raw `partial_json` text.
//! - [`openai`]: finish-reason style. Tool identity and argument fragments
//!   arrive interleaved, addressed by index, and the turn ends with
//!   `finish_reason: "tool_calls"`.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{ChatRequest, ChatStreamHandle};

pub mod anthropic;
pub mod openai;

/// Streaming chat contract every vendor adapter implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider identifier used in logs
    fn provider_id(&self) -> &'static str;

    /// Model used when a request does not name one
    fn default_model(&self) -> &str;

    /// Open a streaming completion.
    ///
    /// Errors before the first event (bad credentials, unreachable endpoint)
    /// are returned here; errors during the stream arrive as `Err` items.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStreamHandle, LlmError>;
}

/// Builds a vendor request body from a provider-neutral request.
pub trait RequestTransformer {
    fn provider_id(&self) -> &str;

    fn transform_chat(&self, req: &ChatRequest) -> Result<serde_json::Value, LlmError>;
}

pub(crate) fn require_model(req: &ChatRequest) -> Result<(), LlmError> {
    if req.model.trim().is_empty() {
        return Err(LlmError::InvalidInput(
            "Model must be specified".to_string(),
        ));
    }
    Ok(())
}
