//! Server-sent events decoding for the timer service's `/events` stream.
//!
//! [`SseDecoder`] turns response body chunks into [`SseFrame`]s; the frame
//! payload is then read as a [`ServiceMessage`]. Chunk boundaries may fall
//! anywhere, including inside a multi-byte character.

use serde::Deserialize;
use serde_json::Value;

use crate::idle::FiredTimer;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

#[derive(Debug, Default)]
struct FrameBuilder {
    event: Option<String>,
    data: Vec<String>,
}

impl FrameBuilder {
    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            let frame = SseFrame {
                event: self.event.take(),
                data: self.data.join("\n"),
            };
            self.data.clear();
            return Some(frame);
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = split_field(line);
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }
}

/// `field: value` with one leading space dropped; a bare line is a field
/// with an empty value.
fn split_field(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
    }
}

/// Incremental decoder fed with raw body chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    builder: FrameBuilder,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = text.strip_suffix('\r').unwrap_or(&text);
            if let Some(frame) = self.builder.line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Drop partial state after the connection is lost.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.builder = FrameBuilder::default();
    }
}

// ── Service messages ─────────────────────────────────────────────────

/// JSON payload of a frame on the timer service stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceMessage {
    Connected,
    TimerFired(FiredTimer),
    Other(String),
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl ServiceMessage {
    /// Read a frame payload. Returns `None` for payloads that are not JSON
    /// messages or a `TIMER_FIRED` without a usable timer.
    pub fn parse(data: &str) -> Option<Self> {
        let raw: RawMessage = serde_json::from_str(data).ok()?;
        match raw.kind.as_str() {
            "CONNECTED" => Some(Self::Connected),
            "TIMER_FIRED" => serde_json::from_value(raw.data).ok().map(Self::TimerFired),
            _ => Some(Self::Other(raw.kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn field_splitting() {
        assert_eq!(split_field("data: hello"), ("data", "hello"));
        assert_eq!(split_field("data:hello"), ("data", "hello"));
        assert_eq!(split_field("data:  two"), ("data", " two"));
        assert_eq!(split_field("data: {\"a\":1}"), ("data", "{\"a\":1}"));
        assert_eq!(split_field("data"), ("data", ""));
    }

    #[test]
    fn frames_across_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: tick\nda").is_empty());
        assert!(decoder.push(b"ta: one\r\ndata: two\n").is_empty());
        let frames = decoder.push(b"\n: keepalive\n\ndata: three\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: Some("tick".into()),
                    data: "one\ntwo".into(),
                },
                SseFrame {
                    event: None,
                    data: "three".into(),
                },
            ]
        );
    }

    #[test]
    fn split_multibyte_character_survives() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: café\n\n".as_bytes();
        let (head, tail) = bytes.split_at(10);
        assert!(decoder.push(head).is_empty());
        let frames = decoder.push(tail);
        assert_eq!(frames[0].data, "café");
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: half");
        decoder.reset();
        let frames = decoder.push(b"data: whole\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "whole");
    }

    #[test]
    fn service_messages() {
        assert_eq!(
            ServiceMessage::parse(r#"{"type":"CONNECTED"}"#),
            Some(ServiceMessage::Connected)
        );

        let fired = ServiceMessage::parse(
            r#"{"type":"TIMER_FIRED","data":{"eventType":"IDLE_TRIGGER","eventData":{"timerId":7}}}"#,
        );
        let Some(ServiceMessage::TimerFired(timer)) = fired else {
            panic!("expected a fired timer, got {fired:?}");
        };
        assert_eq!(timer.event_type, "IDLE_TRIGGER");
        assert_eq!(timer.event_data["timerId"], 7);

        assert_eq!(
            ServiceMessage::parse(r#"{"type":"PING"}"#),
            Some(ServiceMessage::Other("PING".into()))
        );
        assert_eq!(ServiceMessage::parse("not json"), None);
        assert_eq!(ServiceMessage::parse(r#"{"type":"TIMER_FIRED"}"#), None);
    }
}
