//! Utility modules shared by the provider adapters and the orchestrator.

pub mod cancel;
pub mod streaming;

pub use cancel::{CancelHandle, make_cancellable_stream};
pub use streaming::{ChunkBuilder, SseEventConverter, StreamFactory};
