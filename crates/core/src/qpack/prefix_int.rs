//! The QPACK/HPACK "prefixed integer" (RFC 7541 §5.1), distinct from the
//! QUIC varint in [`crate::varint`]: the first byte shares its low `N` bits
//! with an integer value and its high bits with representation-specific
//! flags, and the integer continues in following bytes if it overflows the
//! prefix.

use bytes::{Buf, BufMut};

use super::QpackError;

/// Largest number of continuation bytes a u64 value can need (10 groups of 7
/// bits covers the full 64-bit range); the `checked_shl`/`checked_add` guards
/// below still catch genuine overflow.
const MAX_CONTINUATION_BYTES: usize = 10;

/// Encode `value` using an `prefix_bits`-bit prefix, OR'd onto `first_byte_flags`
/// (which must already have its low `prefix_bits` bits clear).
pub fn encode<B: BufMut>(buf: &mut B, prefix_bits: u8, first_byte_flags: u8, value: u64) {
    let max_prefix = (1u64 << prefix_bits) - 1;
    if value < max_prefix {
        buf.put_u8(first_byte_flags | value as u8);
        return;
    }
    buf.put_u8(first_byte_flags | max_prefix as u8);
    let mut remaining = value - max_prefix;
    while remaining >= 128 {
        buf.put_u8(0x80 | (remaining & 0x7F) as u8);
        remaining >>= 7;
    }
    buf.put_u8(remaining as u8);
}

/// Decode a prefixed integer. `prefix_bits` is the width of the initial
/// integer field in the *already-consumed* first byte; the caller passes in
/// that byte's masked low bits as `initial`. Returns the decoded value and
/// leaves `buf` positioned after the encoding.
pub fn decode<B: Buf>(buf: &mut B, prefix_bits: u8, initial: u8) -> Result<u64, QpackError> {
    let max_prefix = (1u64 << prefix_bits) - 1;
    let initial = initial as u64;
    if initial < max_prefix {
        return Ok(initial);
    }
    let mut value = max_prefix;
    let mut shift = 0u32;
    let mut continuation_bytes = 0;
    loop {
        if !buf.has_remaining() {
            return Err(QpackError::DecompressionFailed(
                "truncated prefixed integer".into(),
            ));
        }
        let byte = buf.get_u8();
        continuation_bytes += 1;
        if continuation_bytes > MAX_CONTINUATION_BYTES {
            return Err(QpackError::DecompressionFailed(
                "prefixed integer continuation too long".into(),
            ));
        }
        let added = ((byte & 0x7F) as u64)
            .checked_shl(shift)
            .ok_or_else(|| QpackError::DecompressionFailed("prefixed integer overflow".into()))?;
        value = value
            .checked_add(added)
            .ok_or_else(|| QpackError::DecompressionFailed("prefixed integer overflow".into()))?;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(QpackError::DecompressionFailed(
                "prefixed integer overflow".into(),
            ));
        }
    }
}

/// Slice-based variant for incremental parsers (the QPACK encoder/decoder
/// instruction streams) that must distinguish "not enough bytes yet" from a
/// genuine protocol error, since more bytes may simply not have arrived.
/// Returns `Ok(None)` on an incomplete prefix; `Ok(Some((value, consumed)))`
/// including the first byte in `consumed` on success.
pub fn decode_from_slice(
    data: &[u8],
    prefix_bits: u8,
) -> Result<Option<(u64, usize)>, QpackError> {
    let Some(&first) = data.first() else { return Ok(None) };
    let max_prefix = (1u64 << prefix_bits) - 1;
    let initial = (first as u64) & max_prefix;
    if initial < max_prefix {
        return Ok(Some((initial, 1)));
    }
    let mut value = max_prefix;
    let mut shift = 0u32;
    let mut pos = 1usize;
    loop {
        let Some(&byte) = data.get(pos) else { return Ok(None) };
        pos += 1;
        if pos - 1 > MAX_CONTINUATION_BYTES {
            return Err(QpackError::DecompressionFailed(
                "prefixed integer continuation too long".into(),
            ));
        }
        let added = ((byte & 0x7F) as u64)
            .checked_shl(shift)
            .ok_or_else(|| QpackError::DecompressionFailed("prefixed integer overflow".into()))?;
        value = value
            .checked_add(added)
            .ok_or_else(|| QpackError::DecompressionFailed("prefixed integer overflow".into()))?;
        if byte & 0x80 == 0 {
            return Ok(Some((value, pos)));
        }
        shift += 7;
        if shift >= 64 {
            return Err(QpackError::DecompressionFailed(
                "prefixed integer overflow".into(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn roundtrip(prefix_bits: u8, value: u64) {
        let mut buf = BytesMut::new();
        encode(&mut buf, prefix_bits, 0, value);
        let initial = buf[0] & ((1u16 << prefix_bits) - 1) as u8;
        let mut rest = &buf[1..];
        let decoded = decode(&mut rest, prefix_bits, initial).unwrap();
        assert_eq!(decoded, value);
        assert!(rest.is_empty());
    }

    #[test]
    fn small_values_fit_in_prefix() {
        roundtrip(5, 0);
        roundtrip(5, 30);
        roundtrip(8, 254);
    }

    #[test]
    fn large_values_continue() {
        roundtrip(5, 31);
        roundtrip(5, 1337);
        roundtrip(8, 100_000);
        roundtrip(7, u64::MAX / 2);
    }

    #[test]
    fn rfc7541_c1_3_example() {
        // 1337 encoded with a 5-bit prefix is 0x1f 0x9a 0x0a.
        let mut buf = BytesMut::new();
        encode(&mut buf, 5, 0, 1337);
        assert_eq!(&buf[..], &[0x1f, 0x9a, 0x0a]);
        let mut rest = &buf[1..];
        assert_eq!(decode(&mut rest, 5, 0x1f).unwrap(), 1337);
    }

    #[test]
    fn slice_decode_reports_incomplete() {
        assert_eq!(decode_from_slice(&[], 5).unwrap(), None);
        assert_eq!(decode_from_slice(&[0x1f], 5).unwrap(), None);
        assert_eq!(decode_from_slice(&[0x1f, 0x9a], 5).unwrap(), None);
        assert_eq!(
            decode_from_slice(&[0x1f, 0x9a, 0x0a], 5).unwrap(),
            Some((1337, 3))
        );
    }

    #[test]
    fn rejects_overflow() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut buf = &bytes[..];
        assert!(decode(&mut buf, 5, 0x1f).is_err());
    }
}
