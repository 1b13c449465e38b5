//! Chat message and conversation types

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::tools::{Tool, ToolCall};
use crate::error::LlmError;

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One part of a mixed-content user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Remote URL or `data:` URL
    ImageUrl { url: String },
}

/// User message content: plain text or a list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl UserContent {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for UserContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for UserContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Chat message
///
/// The wire shape is tagged by `role`, so an inbound message without a role
/// does not deserialize.
///
/// ```rust
/// use toolrelay::types::ChatMessage;
///
/// let msg: ChatMessage = serde_json::from_str(r#"{"role":"user","content":"What's on screen?"}"#).unwrap();
/// assert_eq!(msg, ChatMessage::user("What's on screen?"));
/// assert!(serde_json::from_str::<ChatMessage>(r#"{"content":"hi"}"#).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl ChatMessage {
    /// Creates a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Creates a user message
    pub fn user(content: impl Into<UserContent>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Creates an assistant text message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Creates an assistant message requesting a tool call
    pub fn assistant_tool_call(text: Option<String>, call: ToolCall) -> Self {
        Self::Assistant {
            content: text.filter(|t| !t.is_empty()),
            tool_calls: vec![call],
        }
    }

    /// Creates a tool result message
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> MessageRole {
        match self {
            Self::System { .. } => MessageRole::System,
            Self::User { .. } => MessageRole::User,
            Self::Assistant { .. } => MessageRole::Assistant,
            Self::Tool { .. } => MessageRole::Tool,
        }
    }

    /// Tool calls carried by an assistant message
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Ordered message history for a single orchestration run.
///
/// Only grows. Construction and every push check that there is at most one
/// system message, that it comes first, that tool call ids are unique, and
/// that every tool result answers an earlier tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    #[serde(skip)]
    requested: HashSet<String>,
}

impl Conversation {
    pub fn new(messages: Vec<ChatMessage>) -> Result<Self, LlmError> {
        let mut conversation = Self::default();
        for message in messages {
            conversation.push(message)?;
        }
        Ok(conversation)
    }

    /// Append a message after checking it against the history.
    pub fn push(&mut self, message: ChatMessage) -> Result<(), LlmError> {
        match &message {
            ChatMessage::System { .. } if !self.messages.is_empty() => {
                return Err(LlmError::InvalidInput(
                    "a system message is only allowed as the first message".to_string(),
                ));
            }
            ChatMessage::Assistant { tool_calls, .. } => {
                let mut seen = HashSet::new();
                for call in tool_calls {
                    if self.requested.contains(&call.id) || !seen.insert(call.id.as_str()) {
                        return Err(LlmError::InvalidInput(format!(
                            "duplicate tool call id '{}'",
                            call.id
                        )));
                    }
                }
            }
            ChatMessage::Tool { tool_call_id, .. } if !self.requested.contains(tool_call_id) => {
                return Err(LlmError::InvalidInput(format!(
                    "tool result '{tool_call_id}' does not answer any earlier tool call"
                )));
            }
            _ => {}
        }
        for call in message.tool_calls() {
            self.requested.insert(call.id.clone());
        }
        self.messages.push(message);
        Ok(())
    }

    /// Record a model's tool request, optionally with the text it produced before it.
    pub fn push_tool_request(
        &mut self,
        text: Option<String>,
        call: ToolCall,
    ) -> Result<(), LlmError> {
        self.push(ChatMessage::assistant_tool_call(text, call))
    }

    /// Record the dispatcher output for an earlier tool request.
    pub fn push_tool_result(
        &mut self,
        tool_call_id: &str,
        name: &str,
        content: impl Into<String>,
    ) -> Result<(), LlmError> {
        self.push(ChatMessage::tool_result(tool_call_id, name, content))
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Text of the leading system message, if any
    pub fn system_prompt(&self) -> Option<&str> {
        match self.messages.first() {
            Some(ChatMessage::System { content }) => Some(content),
            _ => None,
        }
    }

    /// All messages after the system message
    pub fn turns(&self) -> &[ChatMessage] {
        match self.messages.first() {
            Some(ChatMessage::System { .. }) => &self.messages[1..],
            _ => &self.messages,
        }
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}

impl<'de> Deserialize<'de> for Conversation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let messages = Vec::<ChatMessage>::deserialize(deserializer)?;
        Conversation::new(messages).map_err(serde::de::Error::custom)
    }
}

/// Provider-neutral streaming request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    /// Conversation turns, without the system message
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Tool>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages,
            tools: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
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
}
