//! Tool dispatch
//!
//! The tool implementations themselves (DOM inspection, scripting, UI state
//! snapshots) live behind [`ToolExecutor`]. [`ToolDispatcher`] wraps an
//! executor so that whatever happens inside it, the orchestrator receives a
//! bounded piece of text it can hand back to the model.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

/// Result reported by a tool collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(result: impl Into<Value>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// External tool collaborator.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run tool `name` with structured JSON arguments.
    async fn execute(&self, name: &str, input: Value) -> Result<ToolOutcome, LlmError>;
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, name: &str, input: Value) -> Result<ToolOutcome, LlmError> {
        (**self).execute(name, input).await
    }
}

/// Dispatcher limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Results longer than this many characters are truncated
    pub max_result_chars: usize,
    /// Upper bound for one tool execution; `None` waits indefinitely
    #[serde(with = "crate::config::duration_secs")]
    pub timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_result_chars: 4000,
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl DispatcherConfig {
    pub fn with_max_result_chars(mut self, max_result_chars: usize) -> Self {
        self.max_result_chars = max_result_chars;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Turns executor calls into bounded text and never fails.
pub struct ToolDispatcher {
    executor: Arc<dyn ToolExecutor>,
    config: DispatcherConfig,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    pub fn new(executor: Arc<dyn ToolExecutor>, config: DispatcherConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Execute `name` and return the text to record as the tool message.
    ///
    /// Failures of any sort (an `Err`, an unsuccessful outcome, a timeout or a
    /// panic inside the executor) come back as `"Failed to execute <name>: <reason>"`.
    pub async fn execute(&self, name: &str, input: Value) -> String {
        let call = AssertUnwindSafe(self.executor.execute(name, input)).catch_unwind();

        let outcome = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Ok(Err(LlmError::TimeoutError(format!(
                    "timed out after {}s",
                    limit.as_secs_f32()
                )))),
            },
            None => call.await,
        };

        let text = match outcome {
            Ok(Ok(ToolOutcome {
                success: true,
                result,
                ..
            })) => render_result(result),
            Ok(Ok(ToolOutcome { error, .. })) => {
                failure(name, error.as_deref().unwrap_or("unknown error"))
            }
            Ok(Err(LlmError::ToolExecutionError { message, .. })) => failure(name, &message),
            Ok(Err(e)) => failure(name, &e.to_string()),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                tracing::error!(tool = name, %reason, "tool executor panicked");
                failure(name, &reason)
            }
        };

        truncate_result(text, self.config.max_result_chars)
    }
}

fn failure(name: &str, reason: &str) -> String {
    tracing::warn!(tool = name, reason, "tool execution failed");
    format!("Failed to execute {name}: {reason}")
}

fn render_result(result: Option<Value>) -> String {
    match result {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

/// Cut `text` to `max_chars` characters and append a marker with the original length.
pub fn truncate_result(text: String, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str(&format!(
        "\n\n[Output truncated: showing first {max_chars} characters, total length: {total} characters]"
    ));
    truncated
}
