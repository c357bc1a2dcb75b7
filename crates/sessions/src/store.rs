//! Conversation Store (spec §4.1, component A).
//!
//! Bounded per-caller message histories behind a per-caller mutex. A caller
//! never blocks waiting for the store — a caller already mid-session is
//! refused outright with `CallerBusy` (spec §5's shared-resource policy),
//! not queued.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use ringdown_domain::error::{Error, Result};
use ringdown_domain::Message;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default message window if the caller doesn't configure one. Counts
/// every `Message`, including the system prompt.
pub const DEFAULT_WINDOW: usize = 40;

/// One caller's conversation (spec §3 Conversation Record).
#[derive(Debug, Clone)]
pub struct ConversationRecord {
    pub caller_id: String,
    pub agent_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
    pub pending_tool_calls: HashSet<String>,
}

impl ConversationRecord {
    fn new(caller_id: &str, agent_id: &str) -> Self {
        let now = Utc::now();
        Self {
            caller_id: caller_id.to_string(),
            agent_id: agent_id.to_string(),
            messages: Vec::new(),
            created_at: now,
            last_touched_at: now,
            pending_tool_calls: HashSet::new(),
        }
    }
}

struct CallerSlot {
    lock: Semaphore,
    record: SyncMutex<ConversationRecord>,
}

/// A handle granting exclusive mutation of one caller's conversation for
/// its lifetime. Dropping the handle releases the per-caller lock.
pub struct ConversationHandle {
    caller_id: String,
    slot: Arc<CallerSlot>,
    _permit: OwnedSemaphorePermit,
}

impl ConversationHandle {
    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }
}

/// Bounded per-caller message history store (spec §4.1).
pub struct ConversationStore {
    window: usize,
    callers: SyncMutex<HashMap<String, Arc<CallerSlot>>>,
}

impl ConversationStore {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            callers: SyncMutex::new(HashMap::new()),
        }
    }

    /// Acquire exclusive access to `caller_id`'s conversation, creating it
    /// (seeded with the given `agent_id` and an optional system prompt) on
    /// first contact. Never blocks: a second concurrent acquisition for the
    /// same caller fails immediately with `Error::CallerBusy`.
    pub fn acquire(
        &self,
        caller_id: &str,
        agent_id: &str,
        system_prompt: Option<&str>,
    ) -> Result<ConversationHandle> {
        let slot = {
            let mut callers = self.callers.lock();
            callers
                .entry(caller_id.to_string())
                .or_insert_with(|| {
                    let mut record = ConversationRecord::new(caller_id, agent_id);
                    if let Some(prompt) = system_prompt {
                        record.messages.push(Message::system(prompt));
                    }
                    Arc::new(CallerSlot {
                        lock: Semaphore::new(1),
                        record: SyncMutex::new(record),
                    })
                })
                .clone()
        };

        let permit = Arc::clone(&slot.lock)
            .try_acquire_owned()
            .map_err(|_| Error::CallerBusy(caller_id.to_string()))?;

        Ok(ConversationHandle {
            caller_id: caller_id.to_string(),
            slot,
            _permit: permit,
        })
    }

    /// Append a message to the caller's history, pruning afterward if the
    /// window is exceeded.
    pub fn append(&self, handle: &ConversationHandle, message: Message) {
        let mut record = handle.slot.record.lock();
        record.messages.push(message);
        record.last_touched_at = Utc::now();
        prune(&mut record.messages, self.window);
    }

    /// The ordered message list for the caller, as of now.
    pub fn snapshot(&self, handle: &ConversationHandle) -> Vec<Message> {
        handle.slot.record.lock().messages.clone()
    }

    /// True if the caller's history is empty (no turns yet — S1's greeting
    /// condition).
    pub fn is_fresh(&self, handle: &ConversationHandle) -> bool {
        let record = handle.slot.record.lock();
        record.messages.iter().all(Message::is_system)
    }

    /// Record tool call ids as pending (outstanding) for this turn.
    pub fn mark_pending(&self, handle: &ConversationHandle, tool_call_ids: &[String]) {
        let mut record = handle.slot.record.lock();
        for id in tool_call_ids {
            record.pending_tool_calls.insert(id.clone());
        }
    }

    /// Mark one tool call id resolved. Returns `true` if it was pending.
    pub fn resolve_pending(&self, handle: &ConversationHandle, tool_call_id: &str) -> bool {
        handle.slot.record.lock().pending_tool_calls.remove(tool_call_id)
    }

    /// True if the caller has any unresolved tool calls outstanding.
    pub fn has_pending(&self, handle: &ConversationHandle) -> bool {
        !handle.slot.record.lock().pending_tool_calls.is_empty()
    }

    /// Number of distinct callers currently tracked (for diagnostics).
    pub fn caller_count(&self) -> usize {
        self.callers.lock().len()
    }
}

/// Remove the oldest non-system messages until `messages.len() <= window`,
/// keeping `Assistant(tool_calls=…)` / `ToolResult` pairs intact (spec §4.1,
/// §8 boundary case).
fn prune(messages: &mut Vec<Message>, window: usize) {
    while messages.len() > window {
        let start = if messages.first().map(Message::is_system).unwrap_or(false) {
            1
        } else {
            0
        };
        if start >= messages.len() {
            break;
        }
        let removed = messages.remove(start);
        let mut outstanding: HashSet<String> =
            removed.tool_call_ids().into_iter().map(str::to_string).collect();
        if outstanding.is_empty() {
            continue;
        }
        let mut i = start;
        while i < messages.len() && !outstanding.is_empty() {
            let matches = matches!(
                &messages[i],
                Message::ToolResult { tool_call_id, .. } if outstanding.contains(tool_call_id)
            );
            if matches {
                if let Message::ToolResult { tool_call_id, .. } = messages.remove(i) {
                    outstanding.remove(&tool_call_id);
                }
            } else {
                i += 1;
            }
        }
    }
}
