//! Tool Invocation Engine (spec §4.3, component C): a typed registry that
//! exports JSON-Schema-2020-12 tool descriptors restricted to an agent's
//! allowlist, and dispatches validated invocations under a deadline with
//! cooperative cancellation.

pub mod builtin;
pub mod error;
pub mod registry;

pub use error::{RegisterError, ToolError};
pub use registry::{StatusObserver, ToolContext, ToolHandler, ToolRegistry, ToolSpec};
