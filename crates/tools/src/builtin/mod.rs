//! Illustrative built-in tools. The Tool Invocation Engine itself is
//! tool-agnostic (spec §4.3 leaves concrete tools to the deployment); these
//! two exist to exercise the engine's greenlist and `IntegrationDisabled`
//! contract end to end (spec §8 S2/S4).

mod lookup_docs;
mod send_email;

use crate::registry::{ToolRegistry, ToolSpec};

/// All built-in tool specs, ready to [`ToolRegistry::register`].
pub fn specs() -> Vec<ToolSpec> {
    vec![send_email::spec(), lookup_docs::spec()]
}

/// Register every built-in tool against `registry`. Panics on duplicate
/// registration — this only ever runs once, at startup, against a fresh
/// registry, so a collision here is a programming error.
pub fn register_all(registry: &ToolRegistry) {
    for spec in specs() {
        registry.register(spec).expect("built-in tool names must be unique");
    }
}
