//! Common Streaming Utilities
//!
//! Shared SSE plumbing for every provider adapter: sending the request,
//! classifying HTTP failures, decoding the event stream with
//! eventsource-stream and handing each event to a provider-specific
//! [`SseEventConverter`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::{Event, Eventsource};
use futures_util::StreamExt;
use serde_json::Value;

use crate::error::LlmError;
use crate::types::{ChatStream, ChatStreamChunk, StopReason};

/// Type alias for SSE event conversion future; one event may yield several chunks
pub type SseEventFuture<'a> =
    Pin<Box<dyn Future<Output = Vec<Result<ChatStreamChunk, LlmError>>> + Send + 'a>>;

/// Converts provider-specific SSE events into canonical chunks.
///
/// A converter instance belongs to exactly one stream, so it may keep
/// per-stream state (open tool calls, whether a stop was seen).
pub trait SseEventConverter: Send + Sync {
    /// Convert an SSE event to zero or more chunks
    fn convert_event(&self, event: Event) -> SseEventFuture<'_>;

    /// Handle the `[DONE]` sentinel
    fn handle_stream_end(&self) -> Option<Result<ChatStreamChunk, LlmError>> {
        None
    }
}

/// Stream factory for creating provider streams
pub struct StreamFactory;

impl StreamFactory {
    /// Send `request_builder` and decode the SSE response with `converter`.
    ///
    /// Failures before the first byte are returned directly. Failures after
    /// that are yielded as a final `Err` item and end the stream. With
    /// `idle_timeout` set, waiting longer than the timeout for the response
    /// headers, or between two events, fails with [`LlmError::TimeoutError`].
    pub async fn create_eventsource_stream<C>(
        provider_id: &'static str,
        request_builder: reqwest::RequestBuilder,
        converter: C,
        idle_timeout: Option<Duration>,
    ) -> Result<ChatStream, LlmError>
    where
        C: SseEventConverter + 'static,
    {
        let send = request_builder.send();
        let sent = match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, send).await.map_err(|_| {
                tracing::error!(provider = provider_id, "no response headers before idle timeout");
                LlmError::TimeoutError(format!(
                    "{provider_id} sent no response within {}s",
                    limit.as_secs_f32()
                ))
            })?,
            None => send.await,
        };
        let response = sent.map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = provider_id, status, "provider rejected stream request");
            return Err(classify_http_error(provider_id, status, &body));
        }

        let mut events = Box::pin(response.bytes_stream().eventsource());

        let chat_stream = async_stream::stream! {
            loop {
                let next = match idle_timeout {
                    Some(limit) => match tokio::time::timeout(limit, events.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            yield Err(LlmError::TimeoutError(format!(
                                "{provider_id} stream idle for more than {}s",
                                limit.as_secs_f32()
                            )));
                            break;
                        }
                    },
                    None => events.next().await,
                };

                let event = match next {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        yield Err(LlmError::StreamError(format!("SSE parsing error: {e}")));
                        break;
                    }
                    None => break,
                };

                let data = event.data.trim();
                if data == "[DONE]" {
                    if let Some(end) = converter.handle_stream_end() {
                        yield end;
                    }
                    break;
                }
                if data.is_empty() {
                    continue;
                }

                let mut failed = false;
                for item in converter.convert_event(event).await {
                    failed |= item.is_err();
                    yield item;
                }
                if failed {
                    break;
                }
            }
        };

        Ok(Box::pin(chat_stream))
    }
}

fn map_send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        return LlmError::TimeoutError(format!("Request timed out: {e}"));
    }
    if e.is_connect() {
        return LlmError::ConnectionError(format!("Connection error: {e}"));
    }
    LlmError::HttpError(format!("Failed to send request: {e}"))
}

/// Build an [`LlmError::ApiError`] from a non-success response body.
pub fn classify_http_error(provider_id: &str, status: u16, body: &str) -> LlmError {
    let details = serde_json::from_str::<Value>(body).ok();
    let message = details
        .as_ref()
        .and_then(extract_error_message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("{provider_id} returned HTTP {status}")
            } else {
                body.trim().to_string()
            }
        });
    LlmError::ApiError {
        code: status,
        message,
        details,
    }
}

/// Pull `error.message` (or a string `error`) out of a provider error payload.
pub fn extract_error_message(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::String(message) => Some(message.clone()),
        error => error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    }
}

/// Helper for building chunk batches inside converters
#[derive(Debug, Default)]
pub struct ChunkBuilder {
    chunks: Vec<ChatStreamChunk>,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self {
            chunks: Vec::with_capacity(2), // Most conversions produce 1-2 chunks
        }
    }

    /// Add a TextDelta (only if the text is not empty)
    pub fn add_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.chunks.push(ChatStreamChunk::TextDelta { text });
        }
        self
    }

    pub fn add_tool_start(
        mut self,
        id: impl Into<String>,
        index: usize,
        name: impl Into<String>,
    ) -> Self {
        self.chunks
            .push(ChatStreamChunk::tool_start(id, index, name));
        self
    }

    /// Add an argument fragment (only if it is not empty)
    pub fn add_fragment(mut self, index: usize, partial_json: impl Into<String>) -> Self {
        let partial_json = partial_json.into();
        if !partial_json.is_empty() {
            self.chunks
                .push(ChatStreamChunk::fragment(index, partial_json));
        }
        self
    }

    pub fn add_parameters(mut self, index: usize, input: Value) -> Self {
        self.chunks
            .push(ChatStreamChunk::ToolCallParametersComplete { index, input });
        self
    }

    pub fn add_stop(mut self, reason: StopReason) -> Self {
        self.chunks.push(ChatStreamChunk::stop(reason));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn build(self) -> Vec<ChatStreamChunk> {
        self.chunks
    }

    /// Build the chunks wrapped in Results
    pub fn build_results(self) -> Vec<Result<ChatStreamChunk, LlmError>> {
        self.chunks.into_iter().map(Ok).collect()
    }
}
