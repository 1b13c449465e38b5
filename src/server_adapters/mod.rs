//! Server adapters: outward event stream and its encodings
//!
//! The orchestrator writes [`OutwardEvent`]s into an [`EventEmitter`]; the
//! receiving half is an [`EventStream`] that a transport turns into a
//! server-push response.
//!
//! - **Framework-agnostic**: [`sse_lines`] yields ready-to-write SSE frames
//! - **Axum integration**: `axum::to_sse_response()` and `axum::chat_router()`
//!   (requires the `server-adapters` feature)
//!
//! ## Example (Framework-agnostic)
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use toolrelay::config::SseOptions;
//! use toolrelay::server_adapters::{event_channel, sse_lines};
//!
//! # async fn example() {
//! let (mut emitter, events) = event_channel(SseOptions::production());
//! emitter.token("Hello");
//! emitter.done();
//!
//! let mut frames = sse_lines(events);
//! while let Some(frame) = frames.next().await {
//!     print!("{frame}");
//! }
//! # }
//! ```

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::SseOptions;
use crate::orchestrator::ToolInvocation;

#[cfg(feature = "server-adapters")]
pub mod axum;

/// Outward event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Token,
    ToolUse,
    ToolResult,
    Error,
    Done,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::ToolUse => "tool_use",
            Self::ToolResult => "tool_result",
            Self::Error => "error",
            Self::Done => "done",
        }
    }
}

/// One unit pushed to the client.
///
/// `data` is plain text for `token`, `tool_result` and `error`, a JSON tool
/// invocation snapshot for `tool_use`, and the literal `true` for `done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutwardEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: String,
}

impl OutwardEvent {
    pub fn new(kind: EventKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Encode as one SSE frame. Multi-line data is split over several `data:` lines.
    pub fn to_sse_frame(&self) -> String {
        let mut frame = format!("event: {}\n", self.kind.as_str());
        for line in self.data.split('\n') {
            frame.push_str("data: ");
            frame.push_str(line.strip_suffix('\r').unwrap_or(line));
            frame.push('\n');
        }
        frame.push('\n');
        frame
    }
}

/// Receiving half of an orchestration run.
pub type EventStream = Pin<Box<dyn Stream<Item = OutwardEvent> + Send>>;

/// Create a connected emitter/stream pair.
///
/// The channel is unbounded: a slow client makes events queue up instead of
/// stalling the orchestrator.
pub fn event_channel(opts: SseOptions) -> (EventEmitter, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    (
        EventEmitter {
            tx,
            opts,
            done_sent: false,
            sent: 0,
        },
        Box::pin(stream),
    )
}

/// Sending half of an orchestration run.
///
/// Events are forwarded in call order. `done` goes out exactly once: the
/// first call to [`EventEmitter::done`] sends it, later events are dropped,
/// and dropping an emitter that never sent it sends it then.
#[derive(Debug)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<OutwardEvent>,
    opts: SseOptions,
    done_sent: bool,
    sent: usize,
}

impl EventEmitter {
    fn send(&mut self, event: OutwardEvent) -> bool {
        if self.done_sent {
            tracing::warn!(kind = event.kind.as_str(), "event after done dropped");
            return false;
        }
        if event.kind == EventKind::Done {
            self.done_sent = true;
        }
        match self.tx.send(event) {
            Ok(()) => {
                self.sent += 1;
                true
            }
            Err(_) => false,
        }
    }

    pub fn token(&mut self, text: impl Into<String>) -> bool {
        self.send(OutwardEvent::new(EventKind::Token, text))
    }

    pub fn tool_use(&mut self, invocation: &ToolInvocation) -> bool {
        let data = serde_json::to_string(invocation)
            .unwrap_or_else(|_| format!(r#"{{"id":"{}"}}"#, invocation.id));
        self.send(OutwardEvent::new(EventKind::ToolUse, data))
    }

    pub fn tool_result(&mut self, text: impl Into<String>) -> bool {
        self.send(OutwardEvent::new(EventKind::ToolResult, text))
    }

    /// Send an `error` event, masked according to the [`SseOptions`].
    pub fn error(&mut self, message: impl Into<String>) -> bool {
        let data = self.opts.render_error(message.into());
        self.send(OutwardEvent::new(EventKind::Error, data))
    }

    /// Send the terminal `done` event; no-op after the first call.
    pub fn done(&mut self) {
        if !self.done_sent {
            self.send(OutwardEvent::new(EventKind::Done, "true"));
        }
    }

    pub fn is_done(&self) -> bool {
        self.done_sent
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the receiving side has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Events accepted by the channel so far
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl Drop for EventEmitter {
    fn drop(&mut self) {
        self.done();
    }
}

/// Convert an [`EventStream`] into SSE frames ("event: X\ndata: ...\n\n").
///
/// The consumer can write each yielded string to the HTTP response.
pub fn sse_lines(events: EventStream) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    Box::pin(events.map(|event| event.to_sse_frame()))
}
