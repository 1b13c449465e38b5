//! Provider selection
//!
//! Resolves a [`ProviderConfig`] into a ready [`ProviderAdapter`] once, at
//! process start. Missing credentials or an unknown vendor fail here, before
//! any stream is opened.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::config::{HttpConfig, parse_var};
use crate::error::LlmError;
use crate::providers::ProviderAdapter;
use crate::providers::anthropic::AnthropicAdapter;
use crate::providers::openai::OpenAiAdapter;

/// Supported vendor wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    #[serde(alias = "openai-compatible")]
    OpenAi,
    Anthropic,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Vendor-specific environment variable holding the API key
    fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" | "openai_compatible" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(LlmError::ConfigurationError(format!(
                "Unknown provider '{other}' (expected 'openai' or 'anthropic')"
            ))),
        }
    }
}

/// Vendor identity, credential, endpoint and default model.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider: ProviderType,
    pub api_key: Option<SecretString>,
    /// Endpoint override; OpenAI-compatible gateways are reached this way
    pub base_url: Option<String>,
    /// Model alias used when a request names none
    pub model: Option<String>,
    pub http: HttpConfig,
}

impl ProviderConfig {
    pub fn new(provider: ProviderType) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Read `TOOLRELAY_PROVIDER`, `TOOLRELAY_API_KEY`, `TOOLRELAY_BASE_URL`,
    /// `TOOLRELAY_MODEL` and `TOOLRELAY_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match non_empty("TOOLRELAY_PROVIDER") {
            Some(raw) => raw.parse::<ProviderType>()?,
            None => ProviderType::default(),
        };

        let mut config = Self::new(provider);
        config.api_key = non_empty("TOOLRELAY_API_KEY")
            .or_else(|| non_empty(provider.api_key_var()))
            .map(SecretString::from);
        config.base_url = non_empty("TOOLRELAY_BASE_URL");
        config.model = non_empty("TOOLRELAY_MODEL");

        if let Some(secs) = parse_var::<f64>(lookup, "TOOLRELAY_TIMEOUT_SECS")? {
            config.http.idle_timeout = (secs > 0.0).then(|| Duration::from_secs_f64(secs));
        }

        Ok(config)
    }
}

/// Build the adapter described by `config`.
///
/// Returns [`LlmError::MissingApiKey`] when no credential is configured and
/// [`LlmError::ConfigurationError`] for an unusable endpoint or HTTP setting.
pub fn select_provider(config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        LlmError::MissingApiKey(format!(
            "No API key configured for provider '{}'",
            config.provider
        ))
    })?;

    if let Some(base_url) = &config.base_url {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| {
            LlmError::ConfigurationError(format!("Invalid base URL '{base_url}': {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LlmError::ConfigurationError(format!(
                "Base URL must use http or https: {base_url}"
            )));
        }
    }

    let client = config.http.build_client()?;

    let adapter: Arc<dyn ProviderAdapter> = match config.provider {
        ProviderType::OpenAi => Arc::new(OpenAiAdapter::new(
            api_key,
            config.base_url.clone(),
            config.model.clone(),
            client,
            config.http.idle_timeout,
        )),
        ProviderType::Anthropic => Arc::new(AnthropicAdapter::new(
            api_key,
            config.base_url.clone(),
            config.model.clone(),
            client,
            config.http.idle_timeout,
        )),
    };

    tracing::info!(
        provider = adapter.provider_id(),
        model = adapter.default_model(),
        "provider adapter selected"
    );
    Ok(adapter)
}
