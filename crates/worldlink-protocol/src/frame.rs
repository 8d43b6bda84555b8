//! The frame parse rule shared by every transport role.
//!
//! A frame that, once trimmed, starts with `{` and ends with `}` is
//! structured and must parse as JSON; a broken one is an error and is
//! never reinterpreted as plain text. Everything else is a legacy
//! plain-text instruction.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{CreateStructureRequest, InboundMessage, MessageKind, ProtocolError};

/// Parses one text frame into an [`InboundMessage`].
///
/// # Errors
/// - [`ProtocolError::InvalidJson`] for a `{…}` frame that is not JSON
/// - [`ProtocolError::UnknownType`] for a tag outside the routing table
/// - [`ProtocolError::InvalidFields`] when fields have the wrong shape
pub fn parse_frame(frame: &str) -> Result<InboundMessage, ProtocolError> {
    let trimmed = frame.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return Ok(InboundMessage::PlainText {
            raw: frame.to_string(),
        });
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(ProtocolError::InvalidJson)?;

    let tag = type_tag(&value);
    let kind = MessageKind::from_tag(&tag)
        .ok_or_else(|| ProtocolError::UnknownType(tag.clone()))?;

    match kind {
        MessageKind::CreateTradingFloor => {
            let req: CreateStructureRequest = fields(kind, value)?;
            Ok(InboundMessage::CreateStructure(req))
        }
        MessageKind::Ping => {
            let ping: PingFields = fields(kind, value)?;
            Ok(InboundMessage::Ping {
                timestamp: ping.timestamp,
            })
        }
        MessageKind::Broadcast => {
            let b: BroadcastFields = fields(kind, value)?;
            Ok(InboundMessage::Broadcast { message: b.message })
        }
        MessageKind::GetServerInfo => Ok(InboundMessage::ServerInfoRequest),
    }
}

#[derive(serde::Deserialize)]
struct PingFields {
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(serde::Deserialize)]
struct BroadcastFields {
    message: String,
}

/// The `type` field rendered as a string; empty when missing.
fn type_tag(value: &Value) -> String {
    match value.get("type") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn fields<T: DeserializeOwned>(
    kind: MessageKind,
    value: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(value)
        .map_err(|source| ProtocolError::InvalidFields { kind, source })
}
