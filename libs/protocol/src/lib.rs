//! # mcgate-protocol
//!
//! Wire framing for the part of the block-game login protocol a routing
//! proxy has to understand:
//!
//! - the VarInt integer encoding
//! - the client's opening handshake packet, parsed incrementally
//! - the login disconnect packet sent to rejected clients
//!
//! Everything here is pure: no I/O and no async.

mod disconnect;
mod error;
mod handshake;
mod varint;

pub use disconnect::{
    disconnect_payload, encode_disconnect, parse_disconnect_reason, DISCONNECT_PACKET_ID,
};
pub use error::{ProtocolError, Result};
pub use handshake::{
    encode_handshake, parse_handshake, Handshake, HANDSHAKE_PACKET_ID, NEXT_STATE_LOGIN,
    NEXT_STATE_STATUS,
};
pub use varint::{
    encode_varint, read_varint, read_varint_at, varint_len, write_varint, VarInt, MAX_VARINT_LEN,
};
