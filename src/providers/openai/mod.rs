//! OpenAI provider
//!
//! Finish-reason tool calls over Chat Completions, including
//! OpenAI-compatible servers.

pub mod client;
pub mod streaming;
pub mod transformers;

pub use client::OpenAiAdapter;
pub use streaming::OpenAiEventConverter;
pub use transformers::OpenAiRequestTransformer;
