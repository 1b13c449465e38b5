//! Shared helpers for end-to-end orchestration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};
use toolrelay::config::SseOptions;
use toolrelay::orchestrator::{Orchestrator, OrchestratorOptions, RunSummary};
use toolrelay::provider::{ProviderConfig, select_provider};
use toolrelay::server_adapters::{EventKind, OutwardEvent, event_channel};
use toolrelay::tools::{DispatcherConfig, ToolDispatcher, ToolExecutor, ToolOutcome};
use toolrelay::types::{Conversation, Tool};
use toolrelay::LlmError;

/// Browser stand-in that records every call it receives
#[derive(Default)]
pub struct RecordingExecutor {
    pub calls: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, name: &str, input: Value) -> Result<ToolOutcome, LlmError> {
        self.calls.lock().unwrap().push((name.to_string(), input));
        match name {
            "get_ui_state" => Ok(ToolOutcome::ok("<screen>login form</screen>")),
            "click_element" => Ok(ToolOutcome::ok("clicked")),
            _ => Ok(ToolOutcome::failed(format!("unknown tool {name}"))),
        }
    }
}

pub fn browser_tools() -> Vec<Tool> {
    vec![
        Tool::function("get_ui_state", "Snapshot the current screen", json!({})),
        Tool::function(
            "click_element",
            "Click the element matching a CSS selector",
            json!({
                "type": "object",
                "properties": { "selector": { "type": "string" } },
                "required": ["selector"]
            }),
        ),
    ]
}

pub fn orchestrator(config: &ProviderConfig, executor: Arc<RecordingExecutor>) -> Orchestrator {
    let provider = select_provider(config).expect("provider");
    let dispatcher = Arc::new(ToolDispatcher::new(executor, DispatcherConfig::default()));
    Orchestrator::new(
        provider,
        dispatcher,
        OrchestratorOptions::default().with_tools(browser_tools()),
    )
}

/// Run one conversation and collect every outward event
pub async fn run_collect(
    orchestrator: &Orchestrator,
    conversation: Conversation,
) -> (RunSummary, Vec<OutwardEvent>) {
    let (emitter, events) = event_channel(SseOptions::development());
    tokio::join!(
        orchestrator.run(conversation, None, emitter),
        events.collect::<Vec<_>>()
    )
}

pub fn kinds(events: &[OutwardEvent]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

/// Concatenated `token` payloads
pub fn tokens(events: &[OutwardEvent]) -> String {
    events
        .iter()
        .filter(|e| e.kind == EventKind::Token)
        .map(|e| e.data.as_str())
        .collect()
}
