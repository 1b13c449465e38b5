//! OpenAI Chat Completions adapter

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::streaming::OpenAiEventConverter;
use super::transformers::OpenAiRequestTransformer;
use crate::error::LlmError;
use crate::providers::{ProviderAdapter, RequestTransformer};
use crate::types::{ChatRequest, ChatStreamHandle};
use crate::utils::streaming::StreamFactory;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Streams chat completions from `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct OpenAiAdapter {
    api_key: SecretString,
    base_url: String,
    model: String,
    http_client: reqwest::Client,
    idle_timeout: Option<Duration>,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl OpenAiAdapter {
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
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider_id(&self) -> &'static str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn chat_stream(&self, mut request: ChatRequest) -> Result<ChatStreamHandle, LlmError> {
        if request.model.is_empty() {
            request.model = self.model.clone();
        }
        let body = OpenAiRequestTransformer.transform_chat(&request)?;
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "opening openai stream"
        );

        let request_builder = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);

        let stream = StreamFactory::create_eventsource_stream(
            "openai",
            request_builder,
            OpenAiEventConverter::new(),
            self.idle_timeout,
        )
        .await?;
        Ok(ChatStreamHandle::new(stream))
    }
}
