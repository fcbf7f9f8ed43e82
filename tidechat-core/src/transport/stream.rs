//! Cancellable read loop over a response body
//!
//! [`pump`] drives a byte stream through [`LineBuffer`] and [`Frame`] and
//! reports to a [`StreamSink`]. The callback contract:
//!
//! - `on_chunk` is called in arrival order, once per text or raw frame
//! - `on_error` is called at most once and ends the read loop
//! - `on_done` is called exactly once, after everything else
//! - once the token is cancelled, only `on_done` fires

use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::frame::{Frame, LineBuffer};
use crate::error::GenerationError;

/// Receiver of stream events
pub trait StreamSink: Send {
    /// Server-side generation id, needed to interrupt the generation
    fn on_generation_id(&mut self, _id: &str) {}

    fn on_chunk(&mut self, text: String);

    fn on_error(&mut self, error: GenerationError);

    fn on_done(&mut self);
}

/// How a stream call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `on_done` was called (possibly after `on_error`)
    Finished,
    /// The token was cancelled; `on_done` was the only callback after that
    Cancelled,
}

enum Step {
    Continue,
    Stop,
}

/// Read `body` to the end, a terminal frame, or cancellation.
pub async fn pump<S, E>(body: S, cancel: &CancellationToken, sink: &mut dyn StreamSink) -> StreamOutcome
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut lines = LineBuffer::new();
    let mut received_bytes = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return finish_cancelled(received_bytes, sink),
            item = body.next() => item,
        };

        match next {
            Some(Ok(chunk)) => {
                received_bytes += chunk.len();
                let mut stop = false;
                for line in lines.push(&chunk) {
                    if cancel.is_cancelled() {
                        return finish_cancelled(received_bytes, sink);
                    }
                    if let Step::Stop = dispatch(&line, sink) {
                        stop = true;
                        break;
                    }
                }
                if stop {
                    break;
                }
            }
            Some(Err(_)) if cancel.is_cancelled() => {
                return finish_cancelled(received_bytes, sink);
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, bytes = received_bytes, "Stream read failed");
                sink.on_error(GenerationError::StreamReadFailed(e.to_string()));
                break;
            }
            None => {
                if let Some(rest) = lines.finish() {
                    if cancel.is_cancelled() {
                        return finish_cancelled(received_bytes, sink);
                    }
                    dispatch(&rest, sink);
                }
                break;
            }
        }
    }

    tracing::debug!(bytes = received_bytes, "Stream finished");
    sink.on_done();
    StreamOutcome::Finished
}

/// Cancellation swallows transport errors but still closes the sink
pub(crate) fn finish_cancelled(
    received_bytes: usize,
    sink: &mut dyn StreamSink,
) -> StreamOutcome {
    tracing::debug!(bytes = received_bytes, "Stream cancelled");
    sink.on_done();
    StreamOutcome::Cancelled
}

fn dispatch(line: &str, sink: &mut dyn StreamSink) -> Step {
    match Frame::parse_line(line) {
        Some(Frame::Text(text)) | Some(Frame::Raw(text)) => {
            sink.on_chunk(text);
            Step::Continue
        }
        Some(Frame::GenerationId(id)) => {
            tracing::debug!(server_generation = %id, "Server assigned generation id");
            sink.on_generation_id(&id);
            Step::Continue
        }
        Some(Frame::Error(message)) => {
            tracing::warn!(error = %message, "Server reported an error in stream");
            sink.on_error(GenerationError::ServerReportedError(message));
            Step::Stop
        }
        Some(Frame::Done) => Step::Stop,
        None => Step::Continue,
    }
}
