//! QPACK string literal encoding (RFC 7541 §5.2 / RFC 9204 §4.5.1): a
//! prefixed length with a single Huffman flag bit somewhere in its leading
//! byte, followed by the raw or Huffman-coded bytes. The flag's bit
//! position and the length prefix's width both vary by representation, so
//! callers pass them in explicitly rather than this module assuming the
//! common "fresh byte, H at 0x80, 7-bit length" shape used for value
//! strings.

use bytes::{BufMut, Bytes, BytesMut};

use super::prefix_int;
use super::QpackError;
use crate::huffman;

/// The Huffman flag and length-prefix width shared by every "Value String
/// Literal" field (RFC 9204 §4.1.1): a fresh byte, H at the top bit, 7-bit
/// length prefix. Used after every representation's name field, regardless
/// of that name field's own (narrower) framing.
const VALUE_HUFFMAN_FLAG: u8 = 0x80;
const VALUE_PREFIX_BITS: u8 = 7;

/// Encode a string literal whose leading byte already carries
/// representation-specific marker bits in `flags` (with the low
/// `prefix_bits` bits clear) and whose Huffman flag lives at `huffman_flag`
/// within that same byte.
pub fn encode(buf: &mut BytesMut, prefix_bits: u8, flags: u8, huffman_flag: u8, data: &[u8]) {
    let huff_len = huffman::encoded_len(data);
    if huff_len < data.len() {
        prefix_int::encode(buf, prefix_bits, flags | huffman_flag, huff_len as u64);
        huffman::encode(data, buf);
    } else {
        prefix_int::encode(buf, prefix_bits, flags, data.len() as u64);
        buf.put_slice(data);
    }
}

/// Decode a string literal starting at `data[0]`, given the length prefix's
/// width and the Huffman flag's bit position within that leading byte.
/// Returns the decoded bytes, whether the Huffman flag was set, and bytes
/// consumed.
pub fn decode(
    data: &[u8],
    prefix_bits: u8,
    huffman_flag: u8,
) -> Result<Option<(Bytes, bool, usize)>, QpackError> {
    let Some(&first) = data.first() else { return Ok(None) };
    let huffman_coded = first & huffman_flag != 0;
    let Some((len, consumed)) = prefix_int::decode_from_slice(data, prefix_bits)? else {
        return Ok(None);
    };
    let len = len as usize;
    let total = consumed + len;
    if data.len() < total {
        return Ok(None);
    }
    let body = &data[consumed..total];
    let decoded = if huffman_coded {
        Bytes::from(huffman::decode(body).map_err(|e| {
            QpackError::DecompressionFailed(format!("invalid huffman literal: {e}"))
        })?)
    } else {
        Bytes::copy_from_slice(body)
    };
    Ok(Some((decoded, huffman_coded, total)))
}

/// Encode a "Value String Literal" (RFC 9204 §4.1.1): every representation
/// carries its value in this same fresh-byte, H-at-top-bit, 7-bit-prefix
/// shape regardless of how the preceding name field was framed.
pub fn encode_value(buf: &mut BytesMut, data: &[u8]) {
    encode(buf, VALUE_PREFIX_BITS, 0, VALUE_HUFFMAN_FLAG, data);
}

pub fn decode_value(data: &[u8]) -> Result<Option<(Bytes, bool, usize)>, QpackError> {
    decode(data, VALUE_PREFIX_BITS, VALUE_HUFFMAN_FLAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_huffman_and_raw_values() {
        for value in [&b""[..], b"hello", b"www.example.com", b"\x01\x02\x03binary"] {
            let mut buf = BytesMut::new();
            encode_value(&mut buf, value);
            let (decoded, _huff, consumed) = decode_value(&buf).unwrap().unwrap();
            assert_eq!(consumed, buf.len());
            assert_eq!(&decoded[..], value);
        }
    }

    #[test]
    fn reports_incomplete_for_partial_body() {
        let mut buf = BytesMut::new();
        encode_value(&mut buf, b"hello world");
        let partial = &buf[..buf.len() - 1];
        assert_eq!(decode_value(partial).unwrap(), None);
    }

    #[test]
    fn narrow_prefix_with_mid_byte_flag_roundtrips() {
        // Mimics the "Literal Field Line With Literal Name" name field:
        // marker bits 001 N at the top, H at 0x08, a 3-bit length prefix.
        let mut buf = BytesMut::new();
        encode(&mut buf, 3, 0b0010_0000, 0x08, b"content-type");
        let (decoded, _huff, consumed) = decode(&buf, 3, 0x08).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(&decoded[..], b"content-type");
    }
}
