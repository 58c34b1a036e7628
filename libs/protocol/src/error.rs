//! Error types for wire decoding.

use thiserror::Error;

/// Errors that make a frame impossible to decode, no matter how many more
/// bytes arrive.
///
/// Running out of input is not an error: decoders report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A VarInt kept its continuation bit set past the fifth byte.
    #[error("VarInt exceeds {max} bytes")]
    VarIntTooLong { max: usize },

    /// The first packet carried an id other than the one expected.
    #[error("unexpected packet id: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedPacketId { expected: u32, actual: u32 },

    /// A length field points past the end of its enclosing packet.
    #[error("{field} length {len} overruns packet of {packet_len} bytes")]
    LengthOverrun {
        field: &'static str,
        len: usize,
        packet_len: usize,
    },

    /// The hostname bytes are not valid UTF-8.
    #[error("hostname is not valid UTF-8: {0}")]
    InvalidHostname(#[from] std::str::Utf8Error),

    /// A disconnect payload did not carry a readable reason.
    #[error("invalid disconnect payload: {0}")]
    InvalidPayload(String),

    /// JSON error in a disconnect payload.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Returns true if the error was raised by the VarInt codec itself.
    pub fn is_varint_overflow(&self) -> bool {
        matches!(self, ProtocolError::VarIntTooLong { .. })
    }
}

/// Result type for wire decoding.
pub type Result<T> = std::result::Result<T, ProtocolError>;
