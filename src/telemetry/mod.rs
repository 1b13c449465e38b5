//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events; binaries and tests call
//! [`init_tracing`] once to decide where they go.
//!
//! ```rust,no_run
//! use toolrelay::telemetry::{LogFormat, init_tracing};
//!
//! init_tracing(LogFormat::from_env()).unwrap();
//! tracing::info!("relay started");
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::error::LlmError;

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// JSON without span lists
    JsonCompact,
}

impl FromStr for LogFormat {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "json-compact" => Ok(Self::JsonCompact),
            other => Err(LlmError::ConfigurationError(format!(
                "Invalid log format: {other}. Valid options: text, json, json-compact"
            ))),
        }
    }
}

impl LogFormat {
    /// `TOOLRELAY_LOG_FORMAT`, falling back to [`LogFormat::Text`] when unset or invalid.
    pub fn from_env() -> Self {
        std::env::var("TOOLRELAY_LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this when
/// a subscriber is already installed is not an error.
pub fn init_tracing(format: LogFormat) -> Result<(), LlmError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let init_result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .with_current_span(true)
            .try_init(),
        LogFormat::JsonCompact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .with_span_list(false)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };

    init_result.map_err(|e| {
        LlmError::ConfigurationError(format!("Failed to initialize tracing: {e}"))
    })
}
