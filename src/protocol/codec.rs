//! One-line JSON encoding and decoding for envelopes.
//!
//! Encoders return the record without its trailing separator; the transport
//! appends `\n`. Decoders take a single already-trimmed line.

use super::{Command, Event};
use crate::error::ProtocolError;
use serde_json::Value;

/// Parse one command line, naming the failure precisely.
///
/// The tag is checked before typed decoding so an unknown `type` is reported
/// as such instead of as a generic serde mismatch.
pub fn decode_command(line: &str) -> Result<Command, ProtocolError> {
    let value: Value = serde_json::from_str(line).map_err(|_| ProtocolError::InvalidJson {
        raw: line.to_string(),
    })?;
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(ProtocolError::InvalidJson {
            raw: line.to_string(),
        });
    };
    if !Command::KNOWN_TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType {
            kind: kind.to_string(),
        });
    }
    let kind = kind.to_string();
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidCommand {
        kind,
        message: e.to_string(),
    })
}

/// Serialize one event as a single JSON line (no separator).
pub fn encode_event(event: &Event) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Host-side counterpart of [`decode_command`].
pub fn decode_event(line: &str) -> Result<Event, ProtocolError> {
    let value: Value = serde_json::from_str(line).map_err(|_| ProtocolError::InvalidJson {
        raw: line.to_string(),
    })?;
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(ProtocolError::InvalidJson {
            raw: line.to_string(),
        });
    };
    if !Event::KNOWN_TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType {
            kind: kind.to_string(),
        });
    }
    let kind = kind.to_string();
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidEvent {
        kind,
        message: e.to_string(),
    })
}

/// Host-side counterpart of [`encode_event`].
pub fn encode_command(command: &Command) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}
