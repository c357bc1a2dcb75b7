//! Shared SSE streaming infrastructure for provider adapters.
//!
//! Buffers response chunks, splits on `\n\n`, extracts `data:` payloads, and
//! feeds each payload to a provider-specific parser that returns zero or
//! more [`StreamEvent`]s. Reused near-verbatim from the teacher's
//! `drain_data_lines`/`sse_response_stream` pair.

use ringdown_domain::error::Error;
use ringdown_domain::stream::{BoxStream, StreamErrorKind, StreamEvent};

/// Extract complete `data:` payloads from an SSE buffer, draining it in
/// place. A trailing partial event is left in `buffer` for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a [`BoxStream`] of [`StreamEvent`] from an SSE `reqwest::Response`
/// and a provider-specific parser closure (`FnMut` because some wire
/// formats need mutable state across calls, e.g. OpenAI's index-keyed
/// tool-call argument accumulation).
///
/// Guarantees the stream's last item is a terminal event (`TurnComplete` or
/// `StreamError`) even if the upstream connection drops mid-body without
/// ever sending one.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, StreamEvent>
where
    F: FnMut(&str) -> Vec<StreamEvent> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut terminated = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        for event in parse_data(&data) {
                            if is_terminal(&event) {
                                terminated = true;
                            }
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            for event in parse_data(&data) {
                                if is_terminal(&event) {
                                    terminated = true;
                                }
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield StreamEvent::StreamError {
                        kind: StreamErrorKind::Transient,
                        message: Error::Transient(e.to_string()).to_string(),
                    };
                    terminated = true;
                    break;
                }
            }
        }

        if !terminated {
            yield StreamEvent::StreamError {
                kind: StreamErrorKind::Other,
                message: "upstream closed the connection without a terminal event".into(),
            };
        }
    };

    Box::pin(stream)
}

fn is_terminal(event: &StreamEvent) -> bool {
    matches!(event, StreamEvent::TurnComplete { .. } | StreamEvent::StreamError { .. })
}
