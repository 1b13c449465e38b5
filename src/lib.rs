//! # toolrelay - Streaming Tool-Call Orchestrator
//!
//! toolrelay drives a conversational model that may call external tools
//! mid-conversation, and relays everything it does to a client as one
//! server-sent event stream.
//!
#![deny(unsafe_code)]

//! ## Features
//!
//! - **One stream model**: OpenAI and Anthropic streaming formats are
//!   normalized into [`types::ChatStreamChunk`] inside their adapters.
//! - **Multi-turn tool loop**: [`orchestrator::Orchestrator`] accumulates
//!   fragmented tool arguments, dispatches the tool, feeds the result back and
//!   resumes streaming until the model answers.
//! - **Tool failures are data**: [`tools::ToolDispatcher`] turns errors,
//!   timeouts and panics into ordinary tool results.
//! - **Stable outward events**: `token`, `tool_use`, `tool_result`, `error`
//!   and a single final `done`, whatever vendor is behind the conversation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use toolrelay::prelude::*;
//!
//! struct Browser;
//!
//! #[async_trait::async_trait]
//! impl ToolExecutor for Browser {
//!     async fn execute(&self, name: &str, _input: serde_json::Value) -> Result<ToolOutcome, LlmError> {
//!         Ok(ToolOutcome::ok(format!("ran {name}")))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::from_env()?;
//!     let provider = select_provider(&config.provider)?;
//!     let dispatcher = Arc::new(ToolDispatcher::new(Arc::new(Browser), config.dispatcher.clone()));
//!     let orchestrator = Orchestrator::new(provider, dispatcher, config.orchestrator.clone());
//!
//!     let conversation = Conversation::new(vec![ChatMessage::user("What's on screen?")])?;
//!     let (emitter, events) = event_channel(config.sse.clone());
//!     let run = tokio::spawn(async move { orchestrator.run(conversation, None, emitter).await });
//!
//!     let mut frames = sse_lines(events);
//!     while let Some(frame) = frames.next().await {
//!         print!("{frame}");
//!     }
//!     let summary = run.await?;
//!     println!("{} messages after {} turns", summary.conversation.len(), summary.turns);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod server_adapters;
pub mod telemetry;
pub mod tools;
pub mod types;
pub mod utils;

pub use error::{ErrorKind, LlmError};

pub mod prelude {
    pub use crate::config::{HttpConfig, RelayConfig, SseOptions};
    pub use crate::error::{ErrorKind, LlmError};
    pub use crate::orchestrator::{
        InvocationStatus, Orchestrator, OrchestratorOptions, RunSummary, ToolInvocation,
    };
    pub use crate::provider::{ProviderConfig, ProviderType, select_provider};
    pub use crate::providers::ProviderAdapter;
    pub use crate::server_adapters::{
        EventEmitter, EventKind, EventStream, OutwardEvent, event_channel, sse_lines,
    };
    pub use crate::tools::{DispatcherConfig, ToolDispatcher, ToolExecutor, ToolOutcome};
    pub use crate::types::{
        ChatMessage, ChatRequest, ChatStream, ChatStreamChunk, ChatStreamHandle, Conversation,
        StopReason, Tool, ToolCall,
    };
}
