//! Conversation Store (A) and Agent Profile Registry (B): per-caller
//! conversation state and the mapping from caller identity to agent
//! profile.

pub mod identity;
pub mod profile;
pub mod store;

pub use identity::normalize_e164;
pub use profile::AgentRegistry;
pub use store::{ConversationHandle, ConversationRecord, ConversationStore, DEFAULT_WINDOW};
