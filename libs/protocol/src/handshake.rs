//! Handshake packet parsing.
//!
//! The handshake is the first packet a client sends:
//!
//! ```text
//! VarInt  packet length (bytes after this field)
//! VarInt  packet id (0x00)
//! VarInt  protocol version
//! VarInt  hostname length
//! [u8]    hostname (UTF-8)
//! u16     port (big endian)
//! VarInt  next state
//! ```
//!
//! Only the fields up to the hostname are interpreted. The parser is
//! incremental: it is called again with a longer prefix whenever more bytes
//! arrive, and it rejects a prefix as soon as it can prove the packet is
//! invalid.

use crate::error::{ProtocolError, Result};
use crate::varint::{read_varint_at, write_varint, VarInt};

/// Packet id of the handshake.
pub const HANDSHAKE_PACKET_ID: u32 = 0x00;

/// Next-state value a client sends when it wants to log in.
pub const NEXT_STATE_LOGIN: u32 = 2;

/// Next-state value a client sends for a server list ping.
pub const NEXT_STATE_STATUS: u32 = 1;

/// Fields extracted from a handshake packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol version announced by the client. Not validated.
    pub protocol_version: i32,
    /// Virtual hostname the client connected to, byte for byte.
    pub hostname: String,
    /// Bytes the whole frame occupies, length prefix included.
    pub frame_len: usize,
}

/// Cursor over a partially received frame.
struct FrameReader<'a> {
    buf: &'a [u8],
    offset: usize,
    frame_end: usize,
}

impl FrameReader<'_> {
    /// Read the next VarInt field, failing if it ends past the frame.
    fn varint(&mut self, field: &'static str) -> Result<Option<VarInt>> {
        let Some(v) = read_varint_at(self.buf, self.offset)? else {
            return Ok(None);
        };
        self.advance(field, v.len)?;
        Ok(Some(v))
    }

    fn advance(&mut self, field: &'static str, len: usize) -> Result<()> {
        let end = self.offset + len;
        if end > self.frame_end {
            return Err(ProtocolError::LengthOverrun {
                field,
                len,
                packet_len: self.frame_end,
            });
        }
        self.offset = end;
        Ok(())
    }
}

/// Try to parse a handshake from the front of `buf`.
///
/// Returns `Ok(None)` while the prefix is valid but incomplete. The frame is
/// complete only once every byte of the declared packet length is present.
pub fn parse_handshake(buf: &[u8]) -> Result<Option<Handshake>> {
    let Some(packet_len) = read_varint_at(buf, 0)? else {
        return Ok(None);
    };

    let frame_len = packet_len.len + packet_len.value as usize;
    let mut reader = FrameReader {
        buf,
        offset: packet_len.len,
        frame_end: frame_len,
    };

    let Some(packet_id) = reader.varint("packet id")? else {
        return Ok(None);
    };
    if packet_id.value != HANDSHAKE_PACKET_ID {
        return Err(ProtocolError::UnexpectedPacketId {
            expected: HANDSHAKE_PACKET_ID,
            actual: packet_id.value,
        });
    }

    let Some(protocol_version) = reader.varint("protocol version")? else {
        return Ok(None);
    };

    let Some(hostname_len) = reader.varint("hostname length")? else {
        return Ok(None);
    };

    let hostname_start = reader.offset;
    reader.advance("hostname", hostname_len.value as usize)?;

    if buf.len() < frame_len {
        return Ok(None);
    }

    let hostname = std::str::from_utf8(&buf[hostname_start..reader.offset])?.to_string();

    Ok(Some(Handshake {
        protocol_version: protocol_version.as_i32(),
        hostname,
        frame_len,
    }))
}

/// Encode a complete handshake frame, as a client would send it.
pub fn encode_handshake(protocol_version: i32, hostname: &str, port: u16, next_state: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(hostname.len() + 16);
    write_varint(HANDSHAKE_PACKET_ID, &mut body);
    write_varint(protocol_version as u32, &mut body);
    write_varint(hostname.len() as u32, &mut body);
    body.extend_from_slice(hostname.as_bytes());
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(next_state, &mut body);

    let mut frame = Vec::with_capacity(body.len() + 5);
    write_varint(body.len() as u32, &mut frame);
    frame.extend_from_slice(&body);
    frame
}
