//! LLM Streaming Driver (spec §4.4, component D).
//!
//! Wraps a concrete [`LlmProvider`] with the behavior the spec requires of
//! "the driver" as opposed to "the wire adapter": first-token and
//! inter-token deadlines, one transparent retry against `backup_model` when
//! the stream fails before any delta was emitted, and cooperative
//! cancellation via a [`CancelToken`]. Runs as its own task and hands events
//! to the caller over a bounded channel (spec §5: "The LLM driver MUST NOT
//! block the session emitter ... delivers events through a bounded channel
//! (capacity 64)"), so the consumer sees each event as it actually arrives
//! rather than the whole turn pre-collected.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;

use ringdown_domain::cancel::CancelToken;
use ringdown_domain::conversation::{Message, ToolDefinition};
use ringdown_domain::error::Result;
use ringdown_domain::stream::{BoxStream, StreamErrorKind, StreamEvent};

use crate::traits::{ChatRequest, LlmProvider};

/// Spec §5's mandated channel capacity for the driver → session-emitter
/// handoff.
const CHANNEL_CAPACITY: usize = 64;

/// One streaming call's parameters, mirroring spec §4.4's `stream(agent,
/// conversation_snapshot, tool_descriptors, cancel)`.
pub struct StreamRequest {
    pub model: String,
    pub backup_model: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub first_token_timeout: Duration,
    pub inter_token_timeout: Duration,
}

/// Drive a streaming chat completion in its own task, applying timeouts,
/// backup-model retry, and cancellation on top of `provider`. Returns
/// immediately with a stream backed by a capacity-64 channel; the caller
/// never blocks on the provider's own pace beyond ordinary channel
/// backpressure.
pub async fn stream(
    provider: Arc<dyn LlmProvider>,
    req: StreamRequest,
    cancel: CancelToken,
) -> BoxStream<'static, StreamEvent> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let first_model = req.model.clone();
        let outcome = open_and_drive(provider.clone(), &req, first_model, cancel.clone(), &tx).await;

        if let DriveOutcome::TransientNoDeltas(first_error) = outcome {
            if let Some(backup) = req.backup_model.clone() {
                tracing::warn!(model = %req.model, backup = %backup, "retrying stream on backup_model");
                if let DriveOutcome::TransientNoDeltas(e) =
                    open_and_drive(provider, &req, backup, cancel, &tx).await
                {
                    let _ = tx.send(e).await;
                }
            } else {
                let _ = tx.send(first_error).await;
            }
        }
    });

    Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }))
}

/// How one attempt (primary or backup model) against `open_and_drive`
/// concluded.
enum DriveOutcome {
    /// The attempt ran to a terminal event (or was cancelled) and has
    /// already sent everything it produced to `tx`.
    Done,
    /// The stream errored before any `TextDelta`/`ToolCallRequest` was
    /// emitted — eligible for backup-model retry. Deliberately NOT sent to
    /// `tx` yet: the caller decides whether to retry or surface it.
    TransientNoDeltas(StreamEvent),
}

/// Drive one attempt against `provider`/`model`, forwarding every event to
/// `tx` as it arrives (true streaming — no whole-turn buffering).
async fn open_and_drive(
    provider: Arc<dyn LlmProvider>,
    req: &StreamRequest,
    model: String,
    cancel: CancelToken,
    tx: &mpsc::Sender<StreamEvent>,
) -> DriveOutcome {
    let chat_req = ChatRequest {
        messages: req.messages.clone(),
        tools: req.tools.clone(),
        model,
    };

    let mut upstream = match provider.chat_stream(chat_req).await {
        Ok(s) => s,
        Err(e) => {
            return DriveOutcome::TransientNoDeltas(StreamEvent::StreamError {
                kind: StreamErrorKind::Transient,
                message: e.to_string(),
            })
        }
    };

    let mut saw_delta = false;
    let mut first = true;

    loop {
        if cancel.is_cancelled() {
            let _ = tx
                .send(StreamEvent::StreamError {
                    kind: StreamErrorKind::Cancelled,
                    message: "turn cancelled".into(),
                })
                .await;
            return DriveOutcome::Done;
        }

        let deadline = if first { req.first_token_timeout } else { req.inter_token_timeout };

        match timeout(deadline, upstream.next()).await {
            Ok(Some(event)) => {
                first = false;
                let is_terminal = matches!(
                    event,
                    StreamEvent::TurnComplete { .. } | StreamEvent::StreamError { .. }
                );
                if matches!(event, StreamEvent::TextDelta { .. } | StreamEvent::ToolCallRequest { .. }) {
                    saw_delta = true;
                }

                if is_terminal {
                    if !saw_delta {
                        if let StreamEvent::StreamError { kind: StreamErrorKind::Transient, .. } = &event {
                            return DriveOutcome::TransientNoDeltas(event);
                        }
                    }
                    let _ = tx.send(event).await;
                    return DriveOutcome::Done;
                }

                if tx.send(event).await.is_err() {
                    // Consumer dropped the stream (e.g. session closed) —
                    // nothing left to drive for.
                    return DriveOutcome::Done;
                }
            }
            Ok(None) => {
                let _ = tx
                    .send(StreamEvent::StreamError {
                        kind: StreamErrorKind::Other,
                        message: "stream ended without a terminal event".into(),
                    })
                    .await;
                return DriveOutcome::Done;
            }
            Err(_elapsed) => {
                let kind = if first { StreamErrorKind::Transient } else { StreamErrorKind::Timeout };
                let message = if first {
                    "first-token timeout exceeded".to_string()
                } else {
                    "inter-token timeout exceeded".to_string()
                };
                if !saw_delta && matches!(kind, StreamErrorKind::Transient) {
                    return DriveOutcome::TransientNoDeltas(StreamEvent::StreamError { kind, message });
                }
                let _ = tx.send(StreamEvent::StreamError { kind, message }).await;
                return DriveOutcome::Done;
            }
        }
    }
}
