//! Disconnect frame encoding.
//!
//! A rejected client receives one frame before the socket is closed:
//!
//! ```text
//! VarInt  remaining length
//! VarInt  packet id (0x00)
//! [u8]    {"text":"<chat component JSON, as a string>"}
//! ```
//!
//! The reason is a chat component that is itself serialized to a JSON
//! string and wrapped in a second `text` object.

use serde_json::{json, Value};

use crate::error::{ProtocolError, Result};
use crate::varint::{read_varint_at, varint_len, write_varint};

/// Packet id of the login disconnect.
pub const DISCONNECT_PACKET_ID: u32 = 0x00;

/// Build the double-encoded JSON payload for `reason`.
pub fn disconnect_payload(reason: &str) -> String {
    let component = json!({ "text": reason }).to_string();
    json!({ "text": component }).to_string()
}

/// Encode a complete disconnect frame carrying `reason`.
pub fn encode_disconnect(reason: &str) -> Vec<u8> {
    let payload = disconnect_payload(reason);
    let remaining = varint_len(DISCONNECT_PACKET_ID) + payload.len();

    let mut frame = Vec::with_capacity(varint_len(remaining as u32) + remaining);
    write_varint(remaining as u32, &mut frame);
    write_varint(DISCONNECT_PACKET_ID, &mut frame);
    frame.extend_from_slice(payload.as_bytes());
    frame
}

/// Decode the reason text from a disconnect frame.
///
/// Returns `Ok(None)` if `buf` does not yet hold the whole frame.
pub fn parse_disconnect_reason(buf: &[u8]) -> Result<Option<String>> {
    let Some(remaining) = read_varint_at(buf, 0)? else {
        return Ok(None);
    };
    let frame_end = remaining.len + remaining.value as usize;
    if buf.len() < frame_end {
        return Ok(None);
    }

    let Some(packet_id) = read_varint_at(&buf[..frame_end], remaining.len)? else {
        return Err(ProtocolError::InvalidPayload("missing packet id".to_string()));
    };
    if packet_id.value != DISCONNECT_PACKET_ID {
        return Err(ProtocolError::UnexpectedPacketId {
            expected: DISCONNECT_PACKET_ID,
            actual: packet_id.value,
        });
    }

    let payload = &buf[remaining.len + packet_id.len..frame_end];
    let outer: Value = serde_json::from_slice(payload)?;
    let component = text_field(&outer)?;
    let inner: Value = serde_json::from_str(component)?;
    Ok(Some(text_field(&inner)?.to_string()))
}

fn text_field(value: &Value) -> Result<&str> {
    value
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::InvalidPayload("missing \"text\" string".to_string()))
}
