//! The header-block prefix (RFC 9204 §4.5.1): the Required Insert Count
//! (RIC), wire-encoded relative to a table-size-derived modulus so it fits
//! in a compact field regardless of how large the dynamic table has grown,
//! plus the Base used to resolve relative dynamic-table references within
//! the block (spec.md §3 "Header block").

use bytes::BytesMut;

use super::{prefix_int, QpackError};

fn max_entries(max_table_capacity: usize) -> u64 {
    (max_table_capacity / 32) as u64
}

/// RFC 9204 §4.5.1.1 "Encoding Required Insert Count".
pub fn encode_required_insert_count(required_insert_count: u64, max_table_capacity: usize) -> u64 {
    if required_insert_count == 0 {
        0
    } else {
        let full_range = 2 * max_entries(max_table_capacity).max(1);
        (required_insert_count % full_range) + 1
    }
}

/// RFC 9204 §4.5.1.1 "Decoding Required Insert Count".
pub fn decode_required_insert_count(
    encoded: u64,
    total_inserts: u64,
    max_table_capacity: usize,
) -> Result<u64, QpackError> {
    if encoded == 0 {
        return Ok(0);
    }
    let max_entries = max_entries(max_table_capacity).max(1);
    let full_range = 2 * max_entries;
    if encoded > full_range {
        return Err(QpackError::DecompressionFailed(
            "encoded required insert count out of range".into(),
        ));
    }
    let max_value = total_inserts + max_entries;
    let max_wrapped = (max_value / full_range) * full_range;
    let mut required_insert_count = max_wrapped + encoded - 1;
    if required_insert_count > max_value {
        if required_insert_count <= full_range {
            return Err(QpackError::DecompressionFailed(
                "required insert count underflow".into(),
            ));
        }
        required_insert_count -= full_range;
    }
    if required_insert_count == 0 {
        return Err(QpackError::DecompressionFailed(
            "required insert count decoded to zero with a nonzero encoding".into(),
        ));
    }
    Ok(required_insert_count)
}

/// Write the two-field prefix: `encoded_insert_count` in an 8-bit prefix,
/// then sign + delta-base in a 7-bit prefix.
pub fn encode(buf: &mut BytesMut, required_insert_count: u64, base: u64, max_table_capacity: usize) {
    let encoded_ric = encode_required_insert_count(required_insert_count, max_table_capacity);
    prefix_int::encode(buf, 8, 0, encoded_ric);
    if base >= required_insert_count {
        let delta = base - required_insert_count;
        prefix_int::encode(buf, 7, 0, delta);
    } else {
        let delta = required_insert_count - base - 1;
        prefix_int::encode(buf, 7, 0x80, delta);
    }
}

/// The decoded prefix plus how many bytes it occupied.
pub struct DecodedPrefix {
    pub required_insert_count: u64,
    pub base: u64,
}

pub fn decode(
    data: &[u8],
    total_inserts: u64,
    max_table_capacity: usize,
) -> Result<Option<(DecodedPrefix, usize)>, QpackError> {
    let Some((encoded_ric, ric_len)) = prefix_int::decode_from_slice(data, 8)? else {
        return Ok(None);
    };
    let required_insert_count =
        decode_required_insert_count(encoded_ric, total_inserts, max_table_capacity)?;
    let rest = &data[ric_len..];
    let Some(&sign_byte) = rest.first() else { return Ok(None) };
    let sign = sign_byte & 0x80 != 0;
    let Some((delta, delta_len)) = prefix_int::decode_from_slice(rest, 7)? else {
        return Ok(None);
    };
    let base = if sign {
        required_insert_count
            .checked_sub(delta + 1)
            .ok_or_else(|| QpackError::DecompressionFailed("base underflow".into()))?
    } else {
        required_insert_count + delta
    };
    Ok(Some((
        DecodedPrefix { required_insert_count, base },
        ric_len + delta_len,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ric_roundtrips_as_zero() {
        assert_eq!(encode_required_insert_count(0, 4096), 0);
        assert_eq!(decode_required_insert_count(0, 0, 4096).unwrap(), 0);
    }

    #[test]
    fn nonzero_ric_roundtrips_through_modulus() {
        let max_cap = 4096usize; // max_entries = 128, full_range = 256
        for &ric in &[1u64, 5, 100, 255, 256, 1000] {
            let encoded = encode_required_insert_count(ric, max_cap);
            let decoded = decode_required_insert_count(encoded, ric, max_cap).unwrap();
            assert_eq!(decoded, ric, "ric={ric} encoded={encoded}");
        }
    }

    #[test]
    fn prefix_roundtrips_pre_and_post_base() {
        let mut buf = BytesMut::new();
        encode(&mut buf, 5, 5, 4096); // base == ric (no post-base refs)
        let (decoded, consumed) = decode(&buf, 5, 4096).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.required_insert_count, 5);
        assert_eq!(decoded.base, 5);

        let mut buf2 = BytesMut::new();
        encode(&mut buf2, 5, 8, 4096); // base ahead of ric (post-base refs)
        let (decoded2, _) = decode(&buf2, 5, 4096).unwrap().unwrap();
        assert_eq!(decoded2.base, 8);

        let mut buf3 = BytesMut::new();
        encode(&mut buf3, 8, 3, 4096); // base behind ric
        let (decoded3, _) = decode(&buf3, 8, 4096).unwrap().unwrap();
        assert_eq!(decoded3.required_insert_count, 8);
        assert_eq!(decoded3.base, 3);
    }
}
