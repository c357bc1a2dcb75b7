//! Shared types for the Ringdown voice-assistant backend: the conversation
//! and tool data model, streaming event types, structured trace events,
//! config, and the shared error enum.

pub mod cancel;
pub mod config;
pub mod conversation;
pub mod error;
pub mod stream;
pub mod trace;

pub use cancel::CancelToken;
pub use conversation::{Message, ToolCall, ToolDefinition};
pub use error::{Error, Result};
pub use stream::{BoxStream, StreamErrorKind, StreamEvent};
pub use trace::TraceEvent;
