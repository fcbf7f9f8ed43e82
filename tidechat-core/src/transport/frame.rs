//! Line framing and frame parsing for the response stream
//!
//! The stream is a text/event-stream body where each meaningful line looks
//! like `data: <payload>`. [`LineBuffer`] turns arbitrary byte chunks into
//! complete lines and [`Frame::parse_line`] classifies each line.

use serde_json::Value;

/// Payload that terminates a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Outcome of parsing one stream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON object carrying a non-empty `text` increment
    Text(String),
    /// Payload that is not a JSON object, passed through verbatim
    Raw(String),
    /// JSON object carrying `error`
    Error(String),
    /// Server-side id of this generation, used by the interrupt endpoint
    GenerationId(String),
    /// The end-of-stream sentinel
    Done,
}

impl Frame {
    /// Parse a complete line. Returns `None` for lines that carry nothing:
    /// blanks, comments, non-`data` fields, and objects without known keys.
    pub fn parse_line(line: &str) -> Option<Frame> {
        let payload = line.strip_prefix("data:")?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        Self::parse_payload(payload)
    }

    /// Parse the payload that follows `data:`.
    pub fn parse_payload(payload: &str) -> Option<Frame> {
        if payload.trim().is_empty() {
            return None;
        }
        if payload.trim() == DONE_SENTINEL {
            return Some(Frame::Done);
        }

        let map = match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => return Some(Frame::Raw(payload.to_string())),
        };

        let text = map
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());

        if let Some(error) = map.get("error").filter(|e| is_truthy(e)) {
            // The backend pairs the raw error with a friendlier `text`
            let message = match (text, error) {
                (Some(text), _) => text.to_string(),
                (None, Value::String(s)) => s.clone(),
                (None, other) => other.to_string(),
            };
            return Some(Frame::Error(message));
        }

        if let Some(id) = map.get("generation_id").filter(|v| is_truthy(v)) {
            let id = match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Some(Frame::GenerationId(id));
        }

        text.map(|t| Frame::Text(t.to_string()))
    }

    /// True for frames after which nothing more is read
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Done | Frame::Error(_))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Accumulates raw bytes and yields complete lines.
///
/// Lines are split on `\n` with a trailing `\r` removed. Bytes are only
/// decoded once a line is complete, so a multi-byte character split across
/// reads is never mangled.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Take the unterminated remainder at end of body, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }

    /// Bytes held waiting for a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
