//! Wire encodings for the QPACK encoder-stream and decoder-stream
//! instructions (RFC 9204 §4.3 / §4.4). spec.md §4.1 "Encoder-stream
//! instructions" / "Decoder-stream instructions".

use bytes::{BufMut, Bytes, BytesMut};

use super::{literal, prefix_int, QpackError};

/// One instruction sent on the encoder stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderInstruction {
    /// §4.3.1 — bounds the dynamic table's capacity; never exceeds the
    /// peer's advertised `SETTINGS_QPACK_MAX_TABLE_CAPACITY`.
    SetDynamicTableCapacity { capacity: u64 },
    /// §4.3.2 — insert referencing an existing name (static or dynamic).
    InsertWithNameReference { static_table: bool, name_index: u64, value: Bytes },
    /// §4.3.3 — insert with both name and value given literally.
    InsertWithoutNameReference { name: Bytes, value: Bytes },
    /// §4.3.4 — re-insert an existing entry at a fresh absolute index.
    /// `relative_index` counts back from the current insert count.
    Duplicate { relative_index: u64 },
}

impl EncoderInstruction {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::SetDynamicTableCapacity { capacity } => {
                prefix_int::encode(buf, 5, 0b001_00000, *capacity);
            }
            Self::InsertWithNameReference { static_table, name_index, value } => {
                let t_flag = if *static_table { 0b0100_0000 } else { 0 };
                prefix_int::encode(buf, 6, 0b1000_0000 | t_flag, *name_index);
                literal::encode_value(buf, value);
            }
            Self::InsertWithoutNameReference { name, value } => {
                // §4.3.3: "0 1 H NameLen(5+)" — H sits at 0x20, not the
                // value literal's 0x80, and the length prefix is 5 bits.
                literal::encode(buf, 5, 0b0100_0000, 0x20, name);
                literal::encode_value(buf, value);
            }
            Self::Duplicate { relative_index } => {
                prefix_int::encode(buf, 5, 0b0000_0000, *relative_index);
            }
        }
    }

    /// Decode one instruction from the front of `data`. `Ok(None)` means
    /// not enough bytes have arrived yet — callers must buffer and retry,
    /// never treat this as `QPACK_ENCODER_STREAM_ERROR` (spec.md §4.1).
    pub fn decode(data: &[u8]) -> Result<Option<(Self, usize)>, QpackError> {
        let Some(&first) = data.first() else { return Ok(None) };
        if first & 0b1000_0000 != 0 {
            // Insert With Name Reference: 1 T NameIndex(6)
            let static_table = first & 0b0100_0000 != 0;
            let Some((name_index, consumed)) = prefix_int::decode_from_slice(data, 6)? else {
                return Ok(None);
            };
            let Some((value, _h, v_consumed)) = literal::decode_value(&data[consumed..])? else {
                return Ok(None);
            };
            Ok(Some((
                Self::InsertWithNameReference { static_table, name_index, value },
                consumed + v_consumed,
            )))
        } else if first & 0b0100_0000 != 0 {
            // Insert Without Name Reference: 01 H NameLen(5) Name Value
            let Some((name, _h, n_consumed)) = literal::decode(data, 5, 0x20)? else {
                return Ok(None);
            };
            let Some((value, _h2, v_consumed)) = literal::decode_value(&data[n_consumed..])? else {
                return Ok(None);
            };
            Ok(Some((
                Self::InsertWithoutNameReference { name, value },
                n_consumed + v_consumed,
            )))
        } else if first & 0b0010_0000 != 0 {
            // Set Dynamic Table Capacity: 001 Capacity(5)
            let Some((capacity, consumed)) = prefix_int::decode_from_slice(data, 5)? else {
                return Ok(None);
            };
            Ok(Some((Self::SetDynamicTableCapacity { capacity }, consumed)))
        } else {
            // Duplicate: 000 Index(5)
            let Some((relative_index, consumed)) = prefix_int::decode_from_slice(data, 5)? else {
                return Ok(None);
            };
            Ok(Some((Self::Duplicate { relative_index }, consumed)))
        }
    }
}

/// One instruction sent on the decoder stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderInstruction {
    /// §4.4.1 — "Section Acknowledgement" in spec.md's terminology.
    SectionAcknowledgement { stream_id: u64 },
    /// §4.4.2
    StreamCancellation { stream_id: u64 },
    /// §4.4.3
    InsertCountIncrement { increment: u64 },
}

impl DecoderInstruction {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::SectionAcknowledgement { stream_id } => {
                prefix_int::encode(buf, 7, 0b1000_0000, *stream_id);
            }
            Self::StreamCancellation { stream_id } => {
                prefix_int::encode(buf, 6, 0b0100_0000, *stream_id);
            }
            Self::InsertCountIncrement { increment } => {
                prefix_int::encode(buf, 6, 0b0000_0000, *increment);
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<Option<(Self, usize)>, QpackError> {
        let Some(&first) = data.first() else { return Ok(None) };
        if first & 0b1000_0000 != 0 {
            let Some((stream_id, consumed)) = prefix_int::decode_from_slice(data, 7)? else {
                return Ok(None);
            };
            Ok(Some((Self::SectionAcknowledgement { stream_id }, consumed)))
        } else if first & 0b0100_0000 != 0 {
            let Some((stream_id, consumed)) = prefix_int::decode_from_slice(data, 6)? else {
                return Ok(None);
            };
            Ok(Some((Self::StreamCancellation { stream_id }, consumed)))
        } else {
            let Some((increment, consumed)) = prefix_int::decode_from_slice(data, 6)? else {
                return Ok(None);
            };
            Ok(Some((Self::InsertCountIncrement { increment }, consumed)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_encoder(instr: EncoderInstruction) {
        let mut buf = BytesMut::new();
        instr.encode(&mut buf);
        let (decoded, consumed) = EncoderInstruction::decode(&buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, instr);
    }

    #[test]
    fn encoder_instructions_roundtrip() {
        roundtrip_encoder(EncoderInstruction::SetDynamicTableCapacity { capacity: 4096 });
        roundtrip_encoder(EncoderInstruction::InsertWithNameReference {
            static_table: true,
            name_index: 17,
            value: Bytes::from_static(b"GET"),
        });
        roundtrip_encoder(EncoderInstruction::InsertWithNameReference {
            static_table: false,
            name_index: 3,
            value: Bytes::from_static(b"custom-value"),
        });
        roundtrip_encoder(EncoderInstruction::InsertWithoutNameReference {
            name: Bytes::from_static(b"x-custom"),
            value: Bytes::from_static(b"hello"),
        });
        roundtrip_encoder(EncoderInstruction::Duplicate { relative_index: 5 });
    }

    #[test]
    fn encoder_instruction_incomplete_is_none() {
        let mut buf = BytesMut::new();
        EncoderInstruction::InsertWithoutNameReference {
            name: Bytes::from_static(b"x-custom-long-name"),
            value: Bytes::from_static(b"a-fairly-long-value-too"),
        }
        .encode(&mut buf);
        for cut in 1..buf.len() {
            assert_eq!(EncoderInstruction::decode(&buf[..cut]).unwrap(), None);
        }
    }

    fn roundtrip_decoder(instr: DecoderInstruction) {
        let mut buf = BytesMut::new();
        instr.encode(&mut buf);
        let (decoded, consumed) = DecoderInstruction::decode(&buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, instr);
    }

    #[test]
    fn decoder_instructions_roundtrip() {
        roundtrip_decoder(DecoderInstruction::SectionAcknowledgement { stream_id: 4 });
        roundtrip_decoder(DecoderInstruction::StreamCancellation { stream_id: 4 });
        roundtrip_decoder(DecoderInstruction::InsertCountIncrement { increment: 10 });
    }
}
