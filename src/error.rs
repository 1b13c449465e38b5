//! Error Handling Module
//!
//! A single error type, [`LlmError`], is shared by every layer of the relay.
//! Each variant belongs to exactly one [`ErrorKind`], which is what the
//! orchestrator inspects when deciding how a failure is recovered:
//!
//! - `Configuration` errors surface before any stream is opened.
//! - `Transport` errors end the run with an `error` event followed by `done`.
//! - `Parse` errors drop a single tool invocation and the loop continues.
//! - `Execution` errors never escape the tool dispatcher.
//!
//! # Example
//!
//! ```rust
//! use toolrelay::error::{ErrorKind, LlmError};
//!
//! let error = LlmError::api_error(404, "Not found");
//! assert_eq!(error.kind(), ErrorKind::Transport);
//! assert!(!error.is_retryable());
//! ```

use thiserror::Error;

/// Coarse error classification used for recovery decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing credential, unknown provider, invalid endpoint.
    Configuration,
    /// HTTP, network, timeout or in-band provider failures.
    Transport,
    /// Malformed JSON from the provider (tool arguments, SSE payloads).
    Parse,
    /// A tool collaborator failed.
    Execution,
    /// A conversation or request violated an invariant.
    Validation,
    /// Anything else.
    Internal,
}

/// Unified error type.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Credential required by the selected provider was not supplied
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    /// HTTP-level failure (request could not be sent, body could not be read)
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Provider answered with a non-success status or an in-band error event
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Could not connect to the provider
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Provider did not answer in time
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// The SSE byte stream could not be decoded
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Provider payload or tool arguments could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// serde_json failure
    #[error("JSON error: {0}")]
    JsonError(String),

    /// A tool collaborator reported a failure
    #[error("Tool execution error ({tool}): {message}")]
    ToolExecutionError { tool: String, message: String },

    /// Request or conversation violates an invariant
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LlmError {
    /// Shorthand for an [`LlmError::ApiError`] without details.
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Shorthand for an [`LlmError::ToolExecutionError`].
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecutionError {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Recovery class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationError(_) | Self::MissingApiKey(_) => ErrorKind::Configuration,
            Self::HttpError(_)
            | Self::ApiError { .. }
            | Self::ConnectionError(_)
            | Self::TimeoutError(_)
            | Self::StreamError(_) => ErrorKind::Transport,
            Self::ParseError(_) | Self::JsonError(_) => ErrorKind::Parse,
            Self::ToolExecutionError { .. } => ErrorKind::Execution,
            Self::InvalidInput(_) => ErrorKind::Validation,
            Self::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code, when the provider supplied one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { code, .. } if *code != 0 => Some(*code),
            _ => None,
        }
    }

    /// Whether a caller could reasonably retry. The orchestrator itself never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::TimeoutError(_) => true,
            Self::ApiError { code, .. } => matches!(code, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::ApiError { code, message, .. } if *code != 0 => {
                format!("Provider returned {code}: {message}")
            }
            Self::ApiError { message, .. } => format!("Provider error: {message}"),
            Self::MissingApiKey(provider) => format!("No API key configured for {provider}"),
            Self::TimeoutError(_) => "The model provider did not respond in time".to_string(),
            Self::ConnectionError(_) => "Could not reach the model provider".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::TimeoutError(err.to_string());
        }
        if err.is_connect() {
            return Self::ConnectionError(err.to_string());
        }
        Self::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}
