//! Wire codec for the SCADA WebSocket protocol
//!
//! Frames are JSON objects carrying a `Request` discriminator. Anything that
//! does not parse as JSON is an opaque binary payload, never a protocol error.

use serde_json::Value;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::types::Result;

/// Discriminator field present on every structured message
pub const DISCRIMINATOR_FIELD: &str = "Request";

/// A structured message tagged with its discriminator
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Value of the `Request` field, if the message carried one
    pub kind: Option<String>,
    /// The full decoded message
    pub body: Value,
}

impl Envelope {
    pub fn new(body: Value) -> Self {
        let kind = body
            .get(DISCRIMINATOR_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { kind, body }
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }

    /// Borrow a field of the message body
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Structured(Envelope),
    Binary(Vec<u8>),
}

/// Encode an outgoing request as a text frame
pub fn encode(request: &Value) -> Result<Message> {
    Ok(Message::Text(serde_json::to_string(request)?))
}

/// Decode a raw payload.
pub fn decode(payload: &[u8]) -> InboundMessage {
    match serde_json::from_slice::<Value>(payload) {
        Ok(body) => InboundMessage::Structured(Envelope::new(body)),
        Err(_) => InboundMessage::Binary(payload.to_vec()),
    }
}

/// Decode a WebSocket message. Control frames yield `None`.
pub fn decode_message(msg: &Message) -> Option<InboundMessage> {
    match msg {
        Message::Text(text) => Some(decode(text.as_bytes())),
        Message::Binary(data) => Some(decode(data)),
        _ => None,
    }
}
