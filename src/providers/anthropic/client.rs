//! Anthropic Messages adapter

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::streaming::AnthropicEventConverter;
use super::transformers::AnthropicRequestTransformer;
use crate::error::LlmError;
use crate::providers::{ProviderAdapter, RequestTransformer};
use crate::types::{ChatRequest, ChatStreamHandle};
use crate::utils::streaming::StreamFactory;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Streams chat completions from `POST {base_url}/v1/messages`.
#[derive(Clone)]
pub struct AnthropicAdapter {
    api_key: SecretString,
    base_url: String,
    model: String,
    http_client: reqwest::Client,
    idle_timeout: Option<Duration>,
}

impl std::fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl AnthropicAdapter {
    pub fn new(
        api_key: SecretString,
        base_url: Option<String>,
        model: Option<String>,
        http_client: reqwest::Client,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            http_client,
            idle_timeout,
        }
    }

    fn endpoint(&self) -> String {
        // Accept base URLs given with or without the version segment
        if self.base_url.ends_with("/v1") {
            format!("{}/messages", self.base_url)
        } else {
            format!("{}/v1/messages", self.base_url)
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider_id(&self) -> &'static str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat_stream(&self, mut request: ChatRequest) -> Result<ChatStreamHandle, LlmError> {
        if request.model.is_empty() {
            request.model = self.model.clone();
        }
        let body = AnthropicRequestTransformer.transform_chat(&request)?;
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "opening anthropic stream"
        );

        let request_builder = self
            .http_client
            .post(self.endpoint())
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);

        let stream = StreamFactory::create_eventsource_stream(
            "anthropic",
            request_builder,
            AnthropicEventConverter::new(),
            self.idle_timeout,
        )
        .await?;
        Ok(ChatStreamHandle::new(stream))
    }
}
