//! VarInt codec.
//!
//! Each byte carries seven value bits, least significant group first, and
//! sets the high bit when another byte follows. The type is bounded to 32
//! bits, so a well-formed VarInt is at most five bytes long.

use crate::error::{ProtocolError, Result};

/// Maximum encoded length of a 32-bit VarInt.
pub const MAX_VARINT_LEN: usize = 5;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// A decoded VarInt and the number of bytes it occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt {
    pub value: u32,
    pub len: usize,
}

impl VarInt {
    /// Interpret the raw bits as the protocol's signed 32-bit integer.
    pub fn as_i32(&self) -> i32 {
        self.value as i32
    }
}

/// Decode a VarInt from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` ends before the terminating byte, which
/// means more data is needed. A sixth byte is never read: if the fifth byte
/// still has its continuation bit set the input is rejected.
pub fn read_varint(buf: &[u8]) -> Result<Option<VarInt>> {
    let mut value: u32 = 0;

    for (i, &byte) in buf.iter().enumerate() {
        value |= u32::from(byte & SEGMENT_BITS) << (7 * i);

        if byte & CONTINUE_BIT == 0 {
            return Ok(Some(VarInt { value, len: i + 1 }));
        }

        if i + 1 == MAX_VARINT_LEN {
            return Err(ProtocolError::VarIntTooLong {
                max: MAX_VARINT_LEN,
            });
        }
    }

    Ok(None)
}

/// Decode a VarInt starting at `offset`.
pub fn read_varint_at(buf: &[u8], offset: usize) -> Result<Option<VarInt>> {
    match buf.get(offset..) {
        Some(rest) => read_varint(rest),
        None => Ok(None),
    }
}

/// Append the minimal encoding of `value` to `out`.
pub fn write_varint(mut value: u32, out: &mut Vec<u8>) {
    loop {
        let byte = (value as u8) & SEGMENT_BITS;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | CONTINUE_BIT);
    }
}

/// Encode `value` into a fresh buffer.
pub fn encode_varint(value: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(varint_len(value));
    write_varint(value, &mut out);
    out
}

/// Number of bytes `value` occupies when encoded.
pub fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode_varint(0), [0x00]);
        assert_eq!(encode_varint(1), [0x01]);
        assert_eq!(encode_varint(127), [0x7F]);
        assert_eq!(encode_varint(128), [0x80, 0x01]);
        assert_eq!(encode_varint(255), [0xFF, 0x01]);
        assert_eq!(encode_varint(25565), [0xDD, 0xC7, 0x01]);
        assert_eq!(encode_varint(2_097_151), [0xFF, 0xFF, 0x7F]);
        assert_eq!(encode_varint(u32::MAX), [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_negative_protocol_value() {
        let decoded = read_varint(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]).unwrap().unwrap();
        assert_eq!(decoded.as_i32(), -1);
        assert_eq!(decoded.len, 5);
    }

    #[test]
    fn test_empty_needs_more() {
        assert!(read_varint(&[]).unwrap().is_none());
    }

    #[test]
    fn test_truncated_needs_more() {
        assert!(read_varint(&[0x80]).unwrap().is_none());
        assert!(read_varint(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap().is_none());
    }

    #[test]
    fn test_six_continuation_bytes_rejected() {
        let err = read_varint(&[0x80; 6]).unwrap_err();
        assert!(err.is_varint_overflow());
    }

    #[test]
    fn test_five_continuation_bytes_rejected_without_sixth() {
        let err = read_varint(&[0xFF; 5]).unwrap_err();
        assert!(matches!(err, ProtocolError::VarIntTooLong { max: 5 }));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let decoded = read_varint(&[0xAC, 0x02, 0xFF, 0xFF]).unwrap().unwrap();
        assert_eq!(decoded, VarInt { value: 300, len: 2 });
    }

    #[test]
    fn test_read_at_offset() {
        let buf = [0x00, 0x05, 0x80, 0x01];
        assert_eq!(read_varint_at(&buf, 1).unwrap().unwrap().value, 5);
        assert_eq!(read_varint_at(&buf, 2).unwrap().unwrap().value, 128);
        assert!(read_varint_at(&buf, 4).unwrap().is_none());
        assert!(read_varint_at(&buf, 9).unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(value in any::<u32>()) {
            let encoded = encode_varint(value);
            prop_assert_eq!(encoded.len(), varint_len(value));
            let decoded = read_varint(&encoded).unwrap().unwrap();
            prop_assert_eq!(decoded, VarInt { value, len: encoded.len() });
        }

        #[test]
        fn prop_every_strict_prefix_needs_more(value in any::<u32>()) {
            let encoded = encode_varint(value);
            for end in 0..encoded.len() {
                prop_assert!(read_varint(&encoded[..end]).unwrap().is_none());
            }
        }
    }
}
