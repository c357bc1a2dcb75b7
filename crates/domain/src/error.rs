/// Shared error type for the Call Session Orchestrator and its components.
///
/// Variants mirror spec §7's taxonomy; doc comments capture each one's
/// propagation policy.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Caller id matched no agent profile and no default is configured.
    /// Surfaced on `setup`; the session is closed with a generic rejection.
    #[error("unknown caller: {0}")]
    UnknownCaller(String),

    /// A session is already active for this caller. Surfaced on `setup`;
    /// the session is closed politely.
    #[error("caller busy: {0}")]
    CallerBusy(String),

    /// Tool argument validation against the JSON Schema failed. Returned
    /// as a ToolResult payload, never fatal.
    #[error("invalid tool arguments: {0}")]
    InvalidArgs(String),

    /// A deadline was exceeded. For tools this becomes a ToolResult; for
    /// the LLM inter-token timeout the driver retries once on the backup
    /// model, then falls back to an apology.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A transient upstream failure (first-token error, network blip).
    /// May be retried once against `agent.backup_model`.
    #[error("transient error: {0}")]
    Transient(String),

    /// The requested integration has no credentials configured. Carries
    /// `{disabled:true, reason}` in its ToolResult payload; never a fatal
    /// error.
    #[error("integration disabled: {0}")]
    IntegrationDisabled(String),

    /// Upstream rate limit. Folded into a ToolResult asking the caller to
    /// retry later.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The Connection Lifetime Governor's 55-minute ceiling was reached.
    /// Recoverable: the gateway is expected to reconnect.
    #[error("connection ceiling reached")]
    ConnectionCeiling,

    /// Store invariant violation, malformed config, or unrecoverable
    /// transport failure. The only variant that terminates the process.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
