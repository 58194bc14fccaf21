//! Wire encoding for enveloped messages.

use crate::{inbound::ServerEvent, outbound::ClientEvent};
use serde_json::Value;

/// Failures of the encode/decode layer.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame has no string `type` discriminant")]
    MissingType,
    #[error("frame of type `{kind}` does not match its schema: {source}")]
    Schema {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode `{kind}`: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(ServerEvent),
    /// A well-formed envelope whose `type` this crate does not know.
    Unknown { kind: String, raw: Value },
}

/// Converts between typed messages and wire bytes.
pub trait MessageCodec: Send + Sync {
    fn encode(&self, event: &ClientEvent) -> Result<String, CodecError>;
    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError>;
}

/// The JSON envelope codec used by the protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, event: &ClientEvent) -> Result<String, CodecError> {
        serde_json::to_string(event).map_err(|source| CodecError::Encode {
            kind: event.kind(),
            source,
        })
    }

    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError> {
        let value: Value = serde_json::from_slice(frame).map_err(CodecError::InvalidJson)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingType)?
            .to_string();

        if !ServerEvent::is_known_kind(&kind) {
            return Ok(Decoded::Unknown { kind, raw: value });
        }

        serde_json::from_value(value)
            .map(Decoded::Event)
            .map_err(|source| CodecError::Schema { kind, source })
    }
}
