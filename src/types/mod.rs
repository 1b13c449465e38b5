//! Core data model: conversation, tool definitions and the canonical stream.

pub mod chat;
pub mod stream;
pub mod tools;

pub use chat::{ChatMessage, ChatRequest, ContentPart, Conversation, MessageRole, UserContent};
pub use stream::{ChatStream, ChatStreamChunk, ChatStreamHandle, StopReason};
pub use tools::{Tool, ToolCall, ToolFunction};
