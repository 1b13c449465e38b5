//! Axum-specific server adapters
//!
//! - **SSE Response**: [`to_sse_response`] turns an [`EventStream`] into an SSE `Response`
//! - **Router**: [`chat_router`] serves `POST /chat`, one orchestration run per request
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toolrelay::config::RelayConfig;
//! use toolrelay::orchestrator::Orchestrator;
//! use toolrelay::provider::select_provider;
//! use toolrelay::server_adapters::axum::{AppState, chat_router};
//! use toolrelay::tools::{ToolDispatcher, ToolExecutor};
//!
//! # async fn serve(executor: Arc<dyn ToolExecutor>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::from_env()?;
//! let provider = select_provider(&config.provider)?;
//! let dispatcher = Arc::new(ToolDispatcher::new(executor, config.dispatcher.clone()));
//! let orchestrator = Orchestrator::new(provider, dispatcher, config.orchestrator.clone());
//!
//! let app = chat_router(AppState::new(orchestrator, config.sse.clone()));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;

use crate::config::SseOptions;
use crate::orchestrator::Orchestrator;
use crate::server_adapters::{EventStream, OutwardEvent, event_channel};
use crate::types::Conversation;

/// Convert an [`EventStream`] into an Axum SSE response.
///
/// Each [`OutwardEvent`] becomes one SSE event named after its type.
/// Keep-alive comments are sent only when [`SseOptions::keep_alive`] is set.
pub fn to_sse_response(events: EventStream, opts: &SseOptions) -> Response {
    let sse = Sse::new(events.map(|event| Ok::<_, Infallible>(to_axum_event(&event))));
    match opts.keep_alive {
        Some(interval) => sse
            .keep_alive(KeepAlive::new().interval(interval))
            .into_response(),
        None => sse.into_response(),
    }
}

fn to_axum_event(event: &OutwardEvent) -> Event {
    // axum splits data on '\n' but rejects bare carriage returns
    let data = event.data.replace("\r\n", "\n").replace('\r', "\n");
    Event::default().event(event.kind.as_str()).data(data)
}

/// Shared state for [`chat_router`].
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sse: SseOptions,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, sse: SseOptions) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            sse,
        }
    }
}

/// Inbound request body: the conversation so far and an optional model.
#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    pub messages: Conversation,
    #[serde(default)]
    pub model: Option<String>,
}

/// `POST /chat` streaming the outward events of one orchestration run.
pub fn chat_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    if payload.messages.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "messages must not be empty" })),
        ));
    }

    let (emitter, events) = event_channel(state.sse.clone());
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator
            .run(payload.messages, payload.model, emitter)
            .await;
    });

    Ok(to_sse_response(events, &state.sse))
}
