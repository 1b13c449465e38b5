//! Process-level configuration
//!
//! Everything here is resolved once at startup and passed down explicitly;
//! nothing is read from the environment per request.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LlmError;
use crate::orchestrator::OrchestratorOptions;
use crate::provider::ProviderConfig;
use crate::tools::DispatcherConfig;

/// HTTP client settings shared by all provider adapters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Time allowed to establish the TCP/TLS connection
    #[serde(with = "duration_secs")]
    pub connect_timeout: Option<Duration>,
    /// Longest allowed gap between two SSE events
    #[serde(with = "duration_secs")]
    pub idle_timeout: Option<Duration>,
    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            idle_timeout: Some(Duration::from_secs(120)),
            headers: HashMap::new(),
            user_agent: Some(concat!("toolrelay/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl HttpConfig {
    /// Build a `reqwest::Client` from this configuration
    pub fn build_client(&self) -> Result<reqwest::Client, LlmError> {
        let mut builder = reqwest::Client::builder();

        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent);
        }

        if !self.headers.is_empty() {
            let mut headers = reqwest::header::HeaderMap::new();
            for (k, v) in &self.headers {
                let name = reqwest::header::HeaderName::from_bytes(k.as_bytes()).map_err(|e| {
                    LlmError::ConfigurationError(format!("Invalid header name '{k}': {e}"))
                })?;
                let value = reqwest::header::HeaderValue::from_str(v).map_err(|e| {
                    LlmError::ConfigurationError(format!("Invalid header value for '{k}': {e}"))
                })?;
                headers.insert(name, value);
            }
            builder = builder.default_headers(headers);
        }

        builder
            .build()
            .map_err(|e| LlmError::ConfigurationError(format!("Failed to build HTTP client: {e}")))
    }
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64))
    }
}

/// Server-push encoding options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SseOptions {
    /// Replace `error` event payloads with a generic message.
    ///
    /// Recommended for production to avoid leaking provider details.
    pub mask_errors: bool,
    /// Message used when `mask_errors` is set; defaults to "internal error"
    pub masked_error_message: Option<String>,
    /// Interval for SSE keep-alive comments
    #[serde(with = "duration_secs")]
    pub keep_alive: Option<Duration>,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self {
            mask_errors: false,
            masked_error_message: None,
            keep_alive: Some(Duration::from_secs(15)),
        }
    }
}

impl SseOptions {
    /// Errors not masked.
    pub fn development() -> Self {
        Self::default()
    }

    /// Errors masked.
    pub fn production() -> Self {
        Self {
            mask_errors: true,
            ..Default::default()
        }
    }

    pub(crate) fn render_error(&self, message: String) -> String {
        if self.mask_errors {
            self.masked_error_message
                .clone()
                .unwrap_or_else(|| "internal error".to_string())
        } else {
            message
        }
    }
}

/// Everything a deployment configures.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub provider: ProviderConfig,
    pub orchestrator: OrchestratorOptions,
    pub dispatcher: DispatcherConfig,
    pub sse: SseOptions,
}

impl RelayConfig {
    /// Read the configuration from `TOOLRELAY_*` environment variables.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `TOOLRELAY_PROVIDER` | `openai` or `anthropic` |
    /// | `TOOLRELAY_API_KEY` | credential (falls back to `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`) |
    /// | `TOOLRELAY_BASE_URL` | endpoint override |
    /// | `TOOLRELAY_MODEL` | default model alias |
    /// | `TOOLRELAY_TIMEOUT_SECS` | idle timeout for provider streams |
    /// | `TOOLRELAY_MAX_TOKENS` | output token limit per turn |
    /// | `TOOLRELAY_MAX_TURNS` | provider turns per request, `0` for unbounded |
    /// | `TOOLRELAY_MAX_RESULT_CHARS` | tool result size bound |
    /// | `TOOLRELAY_MASK_ERRORS` | `true` to mask outward errors |
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LlmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = ProviderConfig::from_lookup(&lookup)?;

        let mut orchestrator = OrchestratorOptions::default();
        if let Some(max_tokens) = parse_var::<u32>(&lookup, "TOOLRELAY_MAX_TOKENS")? {
            orchestrator.max_tokens = Some(max_tokens);
        }
        if let Some(max_turns) = parse_var::<usize>(&lookup, "TOOLRELAY_MAX_TURNS")? {
            orchestrator.max_turns = (max_turns > 0).then_some(max_turns);
        }

        let mut dispatcher = DispatcherConfig::default();
        if let Some(max_chars) = parse_var::<usize>(&lookup, "TOOLRELAY_MAX_RESULT_CHARS")? {
            dispatcher.max_result_chars = max_chars;
        }

        let mut sse = SseOptions::default();
        if let Some(mask) = parse_var::<bool>(&lookup, "TOOLRELAY_MASK_ERRORS")? {
            sse.mask_errors = mask;
        }

        Ok(Self {
            provider,
            orchestrator,
            dispatcher,
            sse,
        })
    }
}

pub(crate) fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, LlmError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| LlmError::ConfigurationError(format!("{key}={raw}: {e}"))),
        None => Ok(None),
    }
}
