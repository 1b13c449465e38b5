//! Anthropic provider
//!
//! Atomic-start tool calls over the Messages API.

pub mod client;
pub mod streaming;
pub mod transformers;

pub use client::AnthropicAdapter;
pub use streaming::AnthropicEventConverter;
pub use transformers::AnthropicRequestTransformer;
