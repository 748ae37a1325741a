//! QUIC-style variable-length integer encoding (RFC 9000 §16).
//!
//! HTTP/3 frame types, frame lengths, unidirectional stream type prefixes
//! and push IDs are all encoded with this varint, distinct from the
//! QPACK "prefixed integer" in [`crate::qpack::prefix_int`].

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Largest value representable by a QUIC varint (62 bits).
pub const MAX_VARINT: u64 = (1 << 62) - 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VarintError {
    #[error("varint exceeds 62-bit range: {0}")]
    TooLarge(u64),
    #[error("buffer does not contain a complete varint")]
    Incomplete,
}

/// Number of bytes needed to encode `value`.
pub fn encoded_len(value: u64) -> usize {
    if value <= 63 {
        1
    } else if value <= 16383 {
        2
    } else if value <= 1_073_741_823 {
        4
    } else {
        8
    }
}

/// Encode `value` onto `buf`. Panics if `value` exceeds [`MAX_VARINT`].
pub fn encode<B: BufMut>(buf: &mut B, value: u64) {
    debug_assert!(value <= MAX_VARINT, "varint value out of range");
    match encoded_len(value) {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16(0b0100_0000_0000_0000 | value as u16),
        4 => buf.put_u32(0x8000_0000 | value as u32),
        8 => buf.put_u64(0xC000_0000_0000_0000 | value),
        _ => unreachable!(),
    }
}

/// Peek at the encoded length of the varint starting at `buf`'s first byte,
/// without consuming anything. Returns `None` if `buf` is empty.
pub fn peek_len(buf: &[u8]) -> Option<usize> {
    let first = *buf.first()?;
    Some(1usize << (first >> 6))
}

/// Decode a varint from the front of `buf`, advancing it on success.
/// Returns `Err(VarintError::Incomplete)` if `buf` does not yet hold enough
/// bytes — callers should buffer more data and retry, never treat this as a
/// protocol error.
pub fn decode<B: Buf>(buf: &mut B) -> Result<u64, VarintError> {
    if !buf.has_remaining() {
        return Err(VarintError::Incomplete);
    }
    let first = buf.chunk()[0];
    let len = 1usize << (first >> 6);
    if buf.remaining() < len {
        return Err(VarintError::Incomplete);
    }
    let tag_mask = 0x3Fu8;
    let value = match len {
        1 => (buf.get_u8() & tag_mask) as u64,
        2 => (buf.get_u16() & 0x3FFF) as u64,
        4 => (buf.get_u32() & 0x3FFF_FFFF) as u64,
        8 => buf.get_u64() & 0x3FFF_FFFF_FFFF_FFFF,
        _ => unreachable!(),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn round_trips_all_length_classes() {
        for &v in &[0u64, 1, 37, 63, 64, 16383, 16384, 1_073_741_823, 1_073_741_824, MAX_VARINT] {
            let mut buf = BytesMut::new();
            encode(&mut buf, v);
            assert_eq!(buf.len(), encoded_len(v));
            let mut slice = &buf[..];
            assert_eq!(decode(&mut slice).unwrap(), v);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn rfc9000_example() {
        // 0xc2197c5eff14e88c decodes to 151288809941952652 per RFC 9000 §A.1
        let bytes = [0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c];
        let mut slice = &bytes[..];
        assert_eq!(decode(&mut slice).unwrap(), 151288809941952652);
    }

    #[test]
    fn incomplete_is_distinguishable() {
        let bytes = [0xC2, 0x19];
        let mut slice = &bytes[..];
        assert_eq!(decode(&mut slice), Err(VarintError::Incomplete));
    }

    #[test]
    fn peek_len_reports_prefix_class() {
        assert_eq!(peek_len(&[0x00]), Some(1));
        assert_eq!(peek_len(&[0x40]), Some(2));
        assert_eq!(peek_len(&[0x80]), Some(4));
        assert_eq!(peek_len(&[0xC0]), Some(8));
        assert_eq!(peek_len(&[]), None);
    }
}
