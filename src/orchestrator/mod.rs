//! Orchestrator for multi-turn streaming tool calling
//!
//! One [`Orchestrator::run`] serves one client request:
//!
//! 1. open a provider stream for the conversation so far;
//! 2. relay text as `token` events while collecting tool calls by index;
//! 3. when the provider stops with [`StopReason::ToolUse`], release the
//!    stream, decode each call's arguments, record the request, dispatch the
//!    tool, record the result, and go back to 1;
//! 4. on any other stop (or end of stream), record the final answer and
//!    finish.
//!
//! Every exit path ends with exactly one `done` event.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use tracing::Instrument;

use crate::error::LlmError;
use crate::providers::ProviderAdapter;
use crate::server_adapters::EventEmitter;
use crate::tools::ToolDispatcher;
use crate::types::{
    ChatMessage, ChatRequest, ChatStreamChunk, ChatStreamHandle, Conversation, StopReason, Tool,
    ToolCall,
};

pub mod accumulator;
pub mod invocation;

pub use accumulator::{MalformedCall, ToolCallAccumulator};
pub use invocation::{InvocationStatus, ToolInvocation};

/// Per-deployment orchestration settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorOptions {
    /// Model used when the request names none; falls back to the adapter default
    pub model: Option<String>,
    /// System prompt used when the conversation carries none
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Provider streams opened per request; `None` for no limit
    pub max_turns: Option<usize>,
    /// Also send raw tool argument fragments as `token` events
    pub mirror_tool_arguments: bool,
    /// Tool catalog offered to the model
    pub tools: Vec<Tool>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: None,
            max_tokens: None,
            temperature: None,
            max_turns: Some(25),
            mirror_tool_arguments: false,
            tools: Vec::new(),
        }
    }
}

impl OrchestratorOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_turns(mut self, max_turns: Option<usize>) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_mirror_tool_arguments(mut self, mirror: bool) -> Self {
        self.mirror_tool_arguments = mirror;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Input conversation plus every message appended during the run
    pub conversation: Conversation,
    /// Provider streams opened
    pub turns: usize,
    /// Completed tool invocations, in execution order
    pub invocations: Vec<ToolInvocation>,
    /// Error that ended the run early, if any
    pub error: Option<LlmError>,
}

/// How a provider turn ended.
enum TurnOutcome {
    /// Tools ran; open a new stream with the extended conversation
    Reopen,
    /// Final answer recorded, provider failure, or turn limit
    Finished,
    /// The client went away
    Disconnected,
}

struct RunState {
    conversation: Conversation,
    turns: usize,
    invocations: Vec<ToolInvocation>,
    /// Every tool call id seen in this conversation
    processed: HashSet<String>,
    error: Option<LlmError>,
}

fn log_rejected(e: &LlmError) {
    tracing::error!(error = %e, "message rejected by conversation");
}

impl RunState {
    /// Record buffered text as an assistant message.
    fn flush_text(&mut self, text: &mut String, emitter: &mut EventEmitter) {
        if text.is_empty() {
            return;
        }
        let message = ChatMessage::assistant(std::mem::take(text));
        if let Err(e) = self.conversation.push(message).inspect_err(log_rejected) {
            emitter.error(e.to_string());
        }
    }
}

/// Drives one provider through a tool-calling conversation.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn ProviderAdapter>,
    dispatcher: Arc<ToolDispatcher>,
    options: OrchestratorOptions,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.provider_id())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        dispatcher: Arc<ToolDispatcher>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            options,
        }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Run the conversation to completion, writing events into `emitter`.
    ///
    /// Never fails: provider errors become `error` events and end the run,
    /// tool failures become ordinary tool results. The emitter is consumed
    /// and always finishes with `done`.
    pub async fn run(
        &self,
        conversation: Conversation,
        model: Option<String>,
        mut emitter: EventEmitter,
    ) -> RunSummary {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "orchestration",
            %request_id,
            provider = self.provider.provider_id()
        );

        async move {
            let model = model
                .or_else(|| self.options.model.clone())
                .unwrap_or_else(|| self.provider.default_model().to_string());

            let processed = conversation
                .messages()
                .iter()
                .flat_map(|m| m.tool_calls())
                .map(|call| call.id.clone())
                .collect();
            let mut state = RunState {
                conversation,
                turns: 0,
                invocations: Vec::new(),
                processed,
                error: None,
            };

            tracing::info!(model = %model, messages = state.conversation.len(), "orchestration started");

            loop {
                if let Some(max_turns) = self.options.max_turns
                    && state.turns >= max_turns
                {
                    let err = LlmError::InternalError(format!(
                        "Stopped after {max_turns} provider turns without a final answer"
                    ));
                    tracing::warn!(max_turns, "turn limit reached");
                    emitter.error(err.to_string());
                    state.error = Some(err);
                    break;
                }

                match self.turn(&model, &mut state, &mut emitter).await {
                    TurnOutcome::Reopen => continue,
                    TurnOutcome::Finished | TurnOutcome::Disconnected => break,
                }
            }

            emitter.done();
            tracing::info!(
                turns = state.turns,
                invocations = state.invocations.len(),
                messages = state.conversation.len(),
                failed = state.error.is_some(),
                "orchestration finished"
            );

            RunSummary {
                conversation: state.conversation,
                turns: state.turns,
                invocations: state.invocations,
                error: state.error,
            }
        }
        .instrument(span)
        .await
    }

    fn build_request(&self, model: &str, conversation: &Conversation) -> ChatRequest {
        let mut request = ChatRequest::new(model, conversation.turns().to_vec())
            .with_tools(self.options.tools.clone());
        request.system = conversation
            .system_prompt()
            .map(str::to_string)
            .or_else(|| self.options.system_prompt.clone());
        request.max_tokens = self.options.max_tokens;
        request.temperature = self.options.temperature;
        request
    }

    fn takes_arguments(&self, name: &str) -> bool {
        self.options
            .tools
            .iter()
            .find(|tool| tool.name() == name)
            .is_none_or(Tool::has_parameters)
    }

    /// Open one provider stream and consume it until it stops.
    async fn turn(
        &self,
        model: &str,
        state: &mut RunState,
        emitter: &mut EventEmitter,
    ) -> TurnOutcome {
        let request = self.build_request(model, &state.conversation);
        state.turns += 1;
        tracing::info!(turn = state.turns, messages = request.messages.len(), "opening provider stream");

        let opened = tokio::select! {
            _ = emitter.closed() => return TurnOutcome::Disconnected,
            opened = self.provider.chat_stream(request) => opened,
        };
        let mut handle: ChatStreamHandle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, kind = ?e.kind(), "failed to open provider stream");
                emitter.error(e.user_message());
                state.error = Some(e);
                return TurnOutcome::Finished;
            }
        };

        let mut text = String::new();
        let mut calls = ToolCallAccumulator::new();

        loop {
            let item = tokio::select! {
                _ = emitter.closed() => {
                    tracing::info!("client disconnected; releasing provider stream");
                    handle.release();
                    return TurnOutcome::Disconnected;
                }
                item = handle.stream.next() => item,
            };

            let chunk = match item {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    tracing::error!(error = %e, kind = ?e.kind(), "provider stream failed");
                    handle.release();
                    emitter.error(e.user_message());
                    state.flush_text(&mut text, emitter);
                    state.error = Some(e);
                    return TurnOutcome::Finished;
                }
                None => {
                    if !calls.is_empty() {
                        tracing::warn!(pending = calls.len(), "stream ended without a tool_use stop; ignoring tool calls");
                    }
                    state.flush_text(&mut text, emitter);
                    return TurnOutcome::Finished;
                }
            };

            match chunk {
                ChatStreamChunk::TextDelta { text: delta } => {
                    text.push_str(&delta);
                    emitter.token(delta);
                }
                ChatStreamChunk::ToolCallStart { id, index, name } => {
                    tracing::debug!(%id, index, %name, "tool call announced");
                    let takes_arguments = self.takes_arguments(&name);
                    calls.start(id, index, name, takes_arguments);
                }
                ChatStreamChunk::ToolCallArgumentFragment {
                    index,
                    partial_json,
                } => {
                    if self.options.mirror_tool_arguments {
                        emitter.token(partial_json.clone());
                    }
                    if !calls.push_fragment(index, &partial_json) {
                        tracing::warn!(index, "argument fragment for unknown tool call");
                    }
                }
                ChatStreamChunk::ToolCallParametersComplete { index, input } => {
                    if !calls.set_parameters(index, input) {
                        tracing::warn!(index, "parameters for unknown tool call");
                    }
                }
                ChatStreamChunk::StreamStop {
                    reason: StopReason::ToolUse,
                } => {
                    let ready = self.resolve_calls(&mut calls, state, emitter);
                    if ready.is_empty() {
                        tracing::warn!("tool_use stop without a usable tool call; continuing stream");
                        continue;
                    }
                    // Only one upstream connection per request
                    handle.release();
                    return self.execute_calls(ready, &mut text, state, emitter).await;
                }
                ChatStreamChunk::StreamStop { reason } => {
                    tracing::info!(?reason, "provider turn finished");
                    if !calls.is_empty() {
                        tracing::warn!(pending = calls.len(), ?reason, "ignoring tool calls without a tool_use stop");
                    }
                    handle.release();
                    state.flush_text(&mut text, emitter);
                    return TurnOutcome::Finished;
                }
            }
        }
    }

    /// Decode accumulated calls, dropping malformed and already-processed ones.
    fn resolve_calls(
        &self,
        calls: &mut ToolCallAccumulator,
        state: &RunState,
        emitter: &mut EventEmitter,
    ) -> Vec<ToolInvocation> {
        let mut ready: Vec<ToolInvocation> = Vec::new();
        for resolved in calls.finish() {
            match resolved {
                Ok(invocation)
                    if state.processed.contains(&invocation.id)
                        || ready.iter().any(|r| r.id == invocation.id) =>
                {
                    tracing::warn!(id = %invocation.id, "duplicate tool call id; skipping");
                    let err = LlmError::InvalidInput(format!(
                        "Tool call {} ({}) was already handled; not running it again",
                        invocation.id, invocation.name
                    ));
                    emitter.error(err.to_string());
                }
                Ok(invocation) => ready.push(invocation),
                Err(MalformedCall { id, name, reason }) => {
                    tracing::warn!(%id, %name, %reason, "dropping tool call with malformed arguments");
                    let err = LlmError::ParseError(format!(
                        "Invalid arguments for tool {name}: {reason}"
                    ));
                    emitter.error(err.to_string());
                }
            }
        }
        ready
    }

    async fn execute_calls(
        &self,
        ready: Vec<ToolInvocation>,
        text: &mut String,
        state: &mut RunState,
        emitter: &mut EventEmitter,
    ) -> TurnOutcome {
        for mut invocation in ready {
            // Text streamed before the tool request rides on the first request message
            let preamble = (!text.is_empty()).then(|| text.clone());
            let call = ToolCall::new(&invocation.id, &invocation.name, invocation.input.clone());
            if let Err(e) = state
                .conversation
                .push_tool_request(preamble, call)
                .inspect_err(log_rejected)
            {
                emitter.error(e.to_string());
                continue;
            }
            text.clear();
            state.processed.insert(invocation.id.clone());

            invocation.status = InvocationStatus::Executing;
            emitter.tool_use(&invocation);
            tracing::info!(id = %invocation.id, tool = %invocation.name, "dispatching tool");

            let result = self
                .dispatcher
                .execute(&invocation.name, invocation.input.clone())
                .await;

            if let Err(e) = state
                .conversation
                .push_tool_result(&invocation.id, &invocation.name, result.clone())
                .inspect_err(log_rejected)
            {
                emitter.error(e.to_string());
            }
            emitter.tool_result(result);
            invocation.status = InvocationStatus::Complete;
            state.invocations.push(invocation);

            if emitter.is_closed() {
                tracing::info!("client disconnected during tool execution");
                return TurnOutcome::Disconnected;
            }
        }
        state.flush_text(text, emitter);
        TurnOutcome::Reopen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SseOptions;
    use crate::server_adapters::{EventKind, OutwardEvent, event_channel};
    use crate::tools::{DispatcherConfig, ToolExecutor, ToolOutcome};
    use crate::types::ChatStream;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts provider streams that are still alive.
    struct OpenStream(Arc<AtomicUsize>);

    impl OpenStream {
        fn track(open: &Arc<AtomicUsize>) -> Self {
            open.fetch_add(1, Ordering::SeqCst);
            Self(open.clone())
        }
    }

    impl Drop for OpenStream {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Replays one scripted chunk list per turn and records the requests it saw.
    struct ScriptedProvider {
        turns: Mutex<Vec<Vec<Result<ChatStreamChunk, LlmError>>>>,
        requests: Mutex<Vec<ChatRequest>>,
        /// Keep each stream open after its script, like a provider that never closes.
        hang: bool,
        open: Arc<AtomicUsize>,
        /// Streams still alive at each `chat_stream` call.
        open_at_call: Mutex<Vec<usize>>,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<Vec<Result<ChatStreamChunk, LlmError>>>) -> Arc<Self> {
            Self::build(turns, false)
        }

        fn hanging(turns: Vec<Vec<Result<ChatStreamChunk, LlmError>>>) -> Arc<Self> {
            Self::build(turns, true)
        }

        fn build(turns: Vec<Vec<Result<ChatStreamChunk, LlmError>>>, hang: bool) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
                hang,
                open: Arc::new(AtomicUsize::new(0)),
                open_at_call: Mutex::new(Vec::new()),
            })
        }

        fn open_streams(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedProvider {
        fn provider_id(&self) -> &'static str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStreamHandle, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.open_at_call.lock().unwrap().push(self.open_streams());
            let chunks = self
                .turns
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::api_error(500, "script exhausted"))?;
            let guard = OpenStream::track(&self.open);
            let hang = self.hang;
            let stream: ChatStream = Box::pin(async_stream::stream! {
                let _guard = guard;
                for chunk in chunks {
                    yield chunk;
                }
                if hang {
                    futures::future::pending::<()>().await;
                }
            });
            Ok(ChatStreamHandle::new(stream))
        }
    }

    struct RecordingExecutor {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ToolExecutor for RecordingExecutor {
        async fn execute(&self, name: &str, input: Value) -> Result<ToolOutcome, LlmError> {
            self.calls.lock().unwrap().push((name.to_string(), input));
            match name {
                "get_ui_state" => Ok(ToolOutcome::ok("<screen>login form</screen>")),
                "explode" => Err(LlmError::tool_execution(name, "browser crashed")),
                _ => Ok(ToolOutcome::ok(json!({"ok": true}))),
            }
        }
    }

    fn setup(
        turns: Vec<Vec<Result<ChatStreamChunk, LlmError>>>,
        options: OrchestratorOptions,
    ) -> (Orchestrator, Arc<ScriptedProvider>, Arc<RecordingExecutor>) {
        setup_with(ScriptedProvider::new(turns), options)
    }

    fn setup_with(
        provider: Arc<ScriptedProvider>,
        options: OrchestratorOptions,
    ) -> (Orchestrator, Arc<ScriptedProvider>, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor {
            calls: Mutex::new(Vec::new()),
        });
        let dispatcher = Arc::new(ToolDispatcher::new(
            executor.clone(),
            DispatcherConfig::default(),
        ));
        (
            Orchestrator::new(provider.clone(), dispatcher, options),
            provider,
            executor,
        )
    }

    async fn run(
        orchestrator: &Orchestrator,
        conversation: Conversation,
    ) -> (RunSummary, Vec<OutwardEvent>) {
        let (emitter, events) = event_channel(SseOptions::development());
        let summary = orchestrator.run(conversation, None, emitter).await;
        let events: Vec<OutwardEvent> = events.collect().await;
        (summary, events)
    }

    fn kinds(events: &[OutwardEvent]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    fn screen_conversation() -> Conversation {
        Conversation::new(vec![
            ChatMessage::system("You are an assistant"),
            ChatMessage::user("What's on screen?"),
        ])
        .unwrap()
    }

    fn ui_tool() -> Tool {
        Tool::function("get_ui_state", "Snapshot the UI", json!({}))
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let (orchestrator, _, executor) = setup(
            vec![vec![
                Ok(ChatStreamChunk::text("Hello")),
                Ok(ChatStreamChunk::text(" there")),
                Ok(ChatStreamChunk::stop(StopReason::End)),
            ]],
            OrchestratorOptions::default(),
        );
        let (summary, events) = run(&orchestrator, screen_conversation()).await;

        assert_eq!(
            kinds(&events),
            vec![EventKind::Token, EventKind::Token, EventKind::Done]
        );
        assert_eq!(summary.conversation.len(), 3);
        assert_eq!(
            summary.conversation.last(),
            Some(&ChatMessage::assistant("Hello there"))
        );
        assert_eq!(summary.turns, 1);
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parameterless_tool_round_trip() {
        let (orchestrator, provider, executor) = setup(
            vec![
                vec![
                    Ok(ChatStreamChunk::tool_start("t1", 0, "get_ui_state")),
                    Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
                ],
                vec![
                    Ok(ChatStreamChunk::text("A login form.")),
                    Ok(ChatStreamChunk::stop(StopReason::End)),
                ],
            ],
            OrchestratorOptions::default().with_tools(vec![ui_tool()]),
        );
        let (summary, events) = run(&orchestrator, screen_conversation()).await;

        assert_eq!(
            executor.calls.lock().unwrap().as_slice(),
            &[("get_ui_state".to_string(), json!({}))]
        );

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].system.as_deref(), Some("You are an assistant"));
        // system + user + assistant(tool call) + tool result
        assert_eq!(requests[1].messages.len() + 1, 4);
        assert_eq!(
            requests[1].messages[1],
            ChatMessage::assistant_tool_call(
                None,
                ToolCall::new("t1", "get_ui_state", json!({}))
            )
        );
        assert_eq!(
            requests[1].messages[2],
            ChatMessage::tool_result("t1", "get_ui_state", "<screen>login form</screen>")
        );

        assert_eq!(
            kinds(&events),
            vec![
                EventKind::ToolUse,
                EventKind::ToolResult,
                EventKind::Token,
                EventKind::Done
            ]
        );
        assert_eq!(summary.conversation.len(), 5);
        assert_eq!(summary.invocations[0].status, InvocationStatus::Complete);
    }

    #[tokio::test]
    async fn test_fragments_round_trip_into_dispatch() {
        let (orchestrator, _, executor) = setup(
            vec![
                vec![
                    Ok(ChatStreamChunk::text("Clicking.")),
                    Ok(ChatStreamChunk::tool_start("t1", 1, "click")),
                    Ok(ChatStreamChunk::fragment(1, "{\"selector\":")),
                    Ok(ChatStreamChunk::fragment(1, " \"#submit\"}")),
                    Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
                ],
                vec![Ok(ChatStreamChunk::stop(StopReason::End))],
            ],
            OrchestratorOptions::default(),
        );
        let (summary, _) = run(&orchestrator, screen_conversation()).await;

        assert_eq!(
            executor.calls.lock().unwrap()[0],
            ("click".to_string(), json!({"selector": "#submit"}))
        );
        // The preamble text rides on the tool request message
        assert_eq!(
            summary.conversation.messages()[2],
            ChatMessage::assistant_tool_call(
                Some("Clicking.".into()),
                ToolCall::new("t1", "click", json!({"selector": "#submit"}))
            )
        );
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_dropped_and_stream_continues() {
        let (orchestrator, _, executor) = setup(
            vec![vec![
                Ok(ChatStreamChunk::tool_start("t1", 0, "click")),
                Ok(ChatStreamChunk::fragment(0, "{\"selector\": ")),
                Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
                Ok(ChatStreamChunk::text("Sorry.")),
                Ok(ChatStreamChunk::stop(StopReason::End)),
            ]],
            OrchestratorOptions::default(),
        );
        let (summary, events) = run(&orchestrator, screen_conversation()).await;

        assert!(executor.calls.lock().unwrap().is_empty());
        assert_eq!(
            kinds(&events),
            vec![EventKind::Error, EventKind::Token, EventKind::Done]
        );
        assert_eq!(summary.conversation.last(), Some(&ChatMessage::assistant("Sorry.")));
    }

    #[tokio::test]
    async fn test_tool_failure_is_conversation_data() {
        let (orchestrator, _, _) = setup(
            vec![
                vec![
                    Ok(ChatStreamChunk::tool_start("t1", 0, "explode")),
                    Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
                ],
                vec![
                    Ok(ChatStreamChunk::text("That failed.")),
                    Ok(ChatStreamChunk::stop(StopReason::End)),
                ],
            ],
            OrchestratorOptions::default(),
        );
        let (summary, events) = run(&orchestrator, screen_conversation()).await;

        let result = events
            .iter()
            .find(|e| e.kind == EventKind::ToolResult)
            .unwrap();
        assert_eq!(result.data, "Failed to execute explode: browser crashed");
        assert!(summary.error.is_none());
        assert_eq!(events.last().unwrap().kind, EventKind::Done);
    }

    #[tokio::test]
    async fn test_stream_error_ends_with_error_then_done() {
        let (orchestrator, _, _) = setup(
            vec![vec![
                Ok(ChatStreamChunk::text("partial")),
                Err(LlmError::StreamError("connection reset".into())),
            ]],
            OrchestratorOptions::default(),
        );
        let (summary, events) = run(&orchestrator, screen_conversation()).await;

        assert_eq!(
            kinds(&events),
            vec![EventKind::Token, EventKind::Error, EventKind::Done]
        );
        assert!(matches!(summary.error, Some(LlmError::StreamError(_))));
        assert_eq!(
            summary.conversation.last(),
            Some(&ChatMessage::assistant("partial"))
        );
    }

    #[tokio::test]
    async fn test_open_failure_ends_with_error_then_done() {
        let (orchestrator, _, _) = setup(vec![], OrchestratorOptions::default());
        let (summary, events) = run(&orchestrator, screen_conversation()).await;
        assert_eq!(kinds(&events), vec![EventKind::Error, EventKind::Done]);
        assert_eq!(summary.conversation.len(), 2);
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let looping = || {
            vec![
                Ok(ChatStreamChunk::tool_start(
                    uuid::Uuid::new_v4().to_string(),
                    0,
                    "get_ui_state",
                )),
                Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
            ]
        };
        let (orchestrator, _, executor) = setup(
            vec![looping(), looping(), looping()],
            OrchestratorOptions::default().with_max_turns(Some(2)),
        );
        let (summary, events) = run(&orchestrator, screen_conversation()).await;

        assert_eq!(summary.turns, 2);
        assert_eq!(executor.calls.lock().unwrap().len(), 2);
        assert_eq!(
            &kinds(&events)[events.len() - 2..],
            &[EventKind::Error, EventKind::Done]
        );
    }

    #[tokio::test]
    async fn test_repeated_tool_call_id_is_not_dispatched_twice() {
        let (orchestrator, _, executor) = setup(
            vec![
                vec![
                    Ok(ChatStreamChunk::tool_start("same", 0, "get_ui_state")),
                    Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
                ],
                vec![
                    Ok(ChatStreamChunk::tool_start("same", 0, "get_ui_state")),
                    Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
                    Ok(ChatStreamChunk::text("Done.")),
                    Ok(ChatStreamChunk::stop(StopReason::End)),
                ],
            ],
            OrchestratorOptions::default(),
        );
        let (summary, events) = run(&orchestrator, screen_conversation()).await;
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
        assert_eq!(summary.invocations.len(), 1);

        let errors: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].data.contains("same"));
        assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Done));
        assert!(summary.error.is_none());
    }

    #[tokio::test]
    async fn test_client_disconnect_releases_provider_stream() {
        let provider = ScriptedProvider::hanging(vec![vec![Ok(ChatStreamChunk::text("Partial"))]]);
        let (orchestrator, provider, executor) =
            setup_with(provider, OrchestratorOptions::default());
        let (emitter, mut events) = event_channel(SseOptions::development());

        let client = async move {
            let first = events.next().await;
            drop(events);
            first
        };
        let (summary, first) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(orchestrator.run(screen_conversation(), None, emitter), client) },
        )
        .await
        .expect("run ends once the client is gone");

        assert_eq!(first, Some(OutwardEvent::new(EventKind::Token, "Partial")));
        assert_eq!(summary.turns, 1);
        assert_eq!(provider.open_streams(), 0);
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_released_before_reopen() {
        let provider = ScriptedProvider::hanging(vec![
            vec![
                Ok(ChatStreamChunk::tool_start("t1", 0, "get_ui_state")),
                Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
            ],
            vec![
                Ok(ChatStreamChunk::text("A login form.")),
                Ok(ChatStreamChunk::stop(StopReason::End)),
            ],
        ]);
        let (orchestrator, provider, executor) = setup_with(
            provider,
            OrchestratorOptions::default().with_tools(vec![ui_tool()]),
        );
        let (summary, events) = tokio::time::timeout(
            Duration::from_secs(5),
            run(&orchestrator, screen_conversation()),
        )
        .await
        .expect("run ends after the final stop");

        assert_eq!(*provider.open_at_call.lock().unwrap(), vec![0, 0]);
        assert_eq!(provider.open_streams(), 0);
        assert_eq!(executor.calls.lock().unwrap().len(), 1);
        assert_eq!(summary.turns, 2);
        assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Done));
    }

    #[tokio::test]
    async fn test_stream_end_without_stop_records_text() {
        let (orchestrator, _, executor) = setup(
            vec![vec![
                Ok(ChatStreamChunk::text("Half")),
                Ok(ChatStreamChunk::text(" answer")),
                Ok(ChatStreamChunk::tool_start("t1", 0, "get_ui_state")),
            ]],
            OrchestratorOptions::default().with_tools(vec![ui_tool()]),
        );
        let (summary, events) = run(&orchestrator, screen_conversation()).await;

        assert_eq!(
            kinds(&events),
            vec![EventKind::Token, EventKind::Token, EventKind::Done]
        );
        assert!(executor.calls.lock().unwrap().is_empty());
        assert_eq!(summary.turns, 1);
        assert!(summary.error.is_none());
        assert_eq!(
            summary.conversation.last(),
            Some(&ChatMessage::assistant("Half answer"))
        );
    }

    #[tokio::test]
    async fn test_max_tokens_and_stop_sequence_end_the_run() {
        for reason in [StopReason::MaxTokens, StopReason::StopSequence] {
            let (orchestrator, provider, executor) = setup(
                vec![vec![
                    Ok(ChatStreamChunk::text("Cut short")),
                    Ok(ChatStreamChunk::tool_start("t1", 0, "get_ui_state")),
                    Ok(ChatStreamChunk::stop(reason)),
                ]],
                OrchestratorOptions::default().with_tools(vec![ui_tool()]),
            );
            let (summary, events) = run(&orchestrator, screen_conversation()).await;

            assert_eq!(kinds(&events), vec![EventKind::Token, EventKind::Done]);
            assert!(executor.calls.lock().unwrap().is_empty());
            assert!(summary.invocations.is_empty());
            assert_eq!(provider.requests.lock().unwrap().len(), 1);
            assert_eq!(
                summary.conversation.last(),
                Some(&ChatMessage::assistant("Cut short"))
            );
        }
    }

    #[tokio::test]
    async fn test_complete_parameters_reach_the_executor() {
        let (orchestrator, _, executor) = setup(
            vec![
                vec![
                    Ok(ChatStreamChunk::tool_start("t1", 0, "scroll")),
                    Ok(ChatStreamChunk::ToolCallParametersComplete {
                        index: 0,
                        input: json!({"dy": 200}),
                    }),
                    Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
                ],
                vec![Ok(ChatStreamChunk::stop(StopReason::End))],
            ],
            OrchestratorOptions::default(),
        );
        let (summary, _) = run(&orchestrator, screen_conversation()).await;

        assert_eq!(
            *executor.calls.lock().unwrap(),
            vec![("scroll".to_string(), json!({"dy": 200}))]
        );
        assert_eq!(summary.invocations[0].input, json!({"dy": 200}));
    }

    #[tokio::test]
    async fn test_mirrored_fragments_become_tokens() {
        let (orchestrator, _, _) = setup(
            vec![
                vec![
                    Ok(ChatStreamChunk::tool_start("t1", 0, "click")),
                    Ok(ChatStreamChunk::fragment(0, "{}")),
                    Ok(ChatStreamChunk::stop(StopReason::ToolUse)),
                ],
                vec![Ok(ChatStreamChunk::stop(StopReason::End))],
            ],
            OrchestratorOptions::default().with_mirror_tool_arguments(true),
        );
        let (_, events) = run(&orchestrator, screen_conversation()).await;
        assert_eq!(events[0], OutwardEvent::new(EventKind::Token, "{}"));
    }

    #[test]
    fn test_default_options() {
        let options = OrchestratorOptions::default();
        assert_eq!(options.max_turns, Some(25));
        assert!(!options.mirror_tool_arguments);
    }
}
