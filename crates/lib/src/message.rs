//! Gate-controller message envelope and framing.
//!
//! Both the serial link and the WebSocket sessions carry the same JSON
//! envelope: `{ "type": "<kind>", "payload": <JSON value> }`. On the serial
//! byte stream each envelope is terminated by [`FRAME_DELIMITER`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminates one frame on the serial byte stream. 0x04 (EOT) cannot occur
/// inside a JSON document, so scanning for it is unambiguous.
pub const FRAME_DELIMITER: u8 = 0x04;

/// The five message kinds the controller protocol knows. Anything else on
/// the wire fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    QueryState,
    QueryStateResult,
    ChangeState,
    Availability,
    Text,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::QueryState => "query_state",
            MessageKind::QueryStateResult => "query_state_result",
            MessageKind::ChangeState => "change_state",
            MessageKind::Availability => "availability",
            MessageKind::Text => "text",
        }
    }
}

/// Failure to turn a frame into a [`Message`].
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("malformed message frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message frame is not valid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),
}

/// One protocol message: a kind tag plus an opaque structured payload.
/// Created at both ends and consumed immediately; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    pub fn new(kind: MessageKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// A state-snapshot request toward the controller.
    pub fn query_state() -> Self {
        Self::new(MessageKind::QueryState, Value::Null)
    }

    /// A human-readable text message.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Text, Value::String(content.into()))
    }

    /// Serialize to the wire envelope (without the frame delimiter).
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(text: &str) -> Result<Self, FrameDecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn decode_bytes(frame: &[u8]) -> Result<Self, FrameDecodeError> {
        Self::decode(std::str::from_utf8(frame)?)
    }
}

/// Accumulates serial bytes and yields complete frames.
///
/// A single physical read may complete zero, one, or many logical frames;
/// the buffer keeps the trailing partial frame until its delimiter arrives.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame (delimiter stripped), if any.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let end = self.buf.iter().position(|b| *b == FRAME_DELIMITER)?;
        let mut frame: Vec<u8> = self.buf.drain(..=end).collect();
        frame.pop();
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_every_kind() {
        let samples = vec![
            Message::query_state(),
            Message::new(MessageKind::QueryStateResult, json!({ "gates": [0, 1, 1] })),
            Message::new(MessageKind::ChangeState, json!({ "gate": 2, "open": true })),
            Message::new(MessageKind::Availability, json!(true)),
            Message::text("hello"),
        ];
        for msg in samples {
            let decoded = Message::decode(&msg.encode()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn unknown_kind_fails_to_decode() {
        let err = Message::decode(r#"{"type":"reboot","payload":null}"#);
        assert!(matches!(err, Err(FrameDecodeError::Malformed(_))));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let msg = Message::decode(r#"{"type":"query_state"}"#).unwrap();
        assert_eq!(msg, Message::query_state());
    }

    #[test]
    fn invalid_utf8_fails_to_decode() {
        assert!(matches!(
            Message::decode_bytes(&[0xff, 0xfe]),
            Err(FrameDecodeError::Encoding(_))
        ));
    }

    #[test]
    fn frame_buffer_reassembles_split_frames() {
        let mut frames = FrameBuffer::new();
        let one = Message::query_state().encode();
        let two = Message::text("x").encode();
        let mut wire = one.clone().into_bytes();
        wire.push(FRAME_DELIMITER);
        wire.extend_from_slice(two.as_bytes());
        wire.push(FRAME_DELIMITER);

        // feed one byte at a time to exercise partial reads
        let mut got = Vec::new();
        for b in wire {
            frames.extend(&[b]);
            while let Some(frame) = frames.next_frame() {
                got.push(frame);
            }
        }
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], one.as_bytes());
        assert_eq!(got[1], two.as_bytes());
    }

    #[test]
    fn frame_buffer_yields_many_frames_from_one_read() {
        let mut frames = FrameBuffer::new();
        let msg = Message::query_state().encode();
        let mut wire = Vec::new();
        for _ in 0..3 {
            wire.extend_from_slice(msg.as_bytes());
            wire.push(FRAME_DELIMITER);
        }
        wire.extend_from_slice(b"{\"type\":"); // trailing partial frame
        frames.extend(&wire);

        let mut count = 0;
        while let Some(frame) = frames.next_frame() {
            assert_eq!(frame, msg.as_bytes());
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
