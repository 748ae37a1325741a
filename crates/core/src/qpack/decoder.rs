//! The QPACK decoder (RFC 9204 §2.2, spec.md §4.1 "Decoding a header
//! block"): mirrors the peer's dynamic table by applying encoder-stream
//! instructions in order, then resolves field-line blocks against it.
//!
//! This module understands all five field-line representations, including
//! the post-base forms (RFC 9204 §4.5.3 / §4.5.5) that [`super::encoder`]
//! never emits itself — a correct decoder has to handle whatever a
//! compliant peer encoder sends, not just its own encoder's subset.

use bytes::{Bytes, BytesMut};

use super::{
    block_prefix, instructions::EncoderInstruction, prefix_int, static_table, DynamicTable, HeaderField,
    QpackError,
};

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Not enough of the dynamic table has arrived yet. The caller should
    /// park the raw block bytes and retry this same call once the encoder
    /// stream has advanced to at least this insert count (spec.md §3
    /// "Blocked-block registry").
    Blocked { required_insert_count: u64 },
    Done { fields: Vec<HeaderField>, required_insert_count: u64 },
}

pub struct QpackDecoder {
    table: DynamicTable,
}

impl QpackDecoder {
    pub fn new(max_table_capacity: usize) -> Self {
        Self { table: DynamicTable::new(max_table_capacity) }
    }

    pub fn insert_count(&self) -> u64 {
        self.table.insert_count()
    }

    /// Apply one already-parsed encoder-stream instruction, mirroring the
    /// encoder's dynamic table. The caller is responsible for notifying any
    /// blocked-stream registry afterward, since insert count may have
    /// advanced.
    pub fn apply_encoder_instruction(&mut self, instr: EncoderInstruction) -> Result<(), QpackError> {
        match instr {
            EncoderInstruction::SetDynamicTableCapacity { capacity } => {
                self.table.set_capacity(capacity as usize)
            }
            EncoderInstruction::InsertWithNameReference { static_table: from_static, name_index, value } => {
                let name = if from_static {
                    static_table::get(name_index as usize)
                        .map(|(n, _)| Bytes::copy_from_slice(n.as_bytes()))
                        .ok_or_else(|| {
                            QpackError::EncoderStreamError(format!("static name index {name_index} out of range"))
                        })?
                } else {
                    let insert_count = self.table.insert_count();
                    let abs = insert_count.checked_sub(1 + name_index).ok_or_else(|| {
                        QpackError::EncoderStreamError("dynamic name reference underflow".into())
                    })?;
                    self.table
                        .get(abs)
                        .map(|f| f.name.clone())
                        .ok_or_else(|| QpackError::EncoderStreamError(format!("dynamic name index {abs} not found")))?
                };
                self.table.insert(HeaderField::new(name, value));
                Ok(())
            }
            EncoderInstruction::InsertWithoutNameReference { name, value } => {
                self.table.insert(HeaderField::new(name, value));
                Ok(())
            }
            EncoderInstruction::Duplicate { relative_index } => {
                let insert_count = self.table.insert_count();
                let abs = insert_count
                    .checked_sub(1 + relative_index)
                    .ok_or_else(|| QpackError::EncoderStreamError("duplicate index underflow".into()))?;
                self.table
                    .duplicate(abs)
                    .ok_or_else(|| QpackError::EncoderStreamError(format!("duplicate target {abs} not found")))?;
                Ok(())
            }
        }
    }

    /// Parse and apply as many complete encoder-stream instructions as are
    /// present in `data`. Returns the number of bytes consumed; the
    /// remainder (a partial instruction) is left for the caller to buffer.
    pub fn decode_encoder_stream(&mut self, data: &[u8]) -> Result<usize, QpackError> {
        let mut offset = 0;
        while offset < data.len() {
            let Some((instr, consumed)) = EncoderInstruction::decode(&data[offset..])? else {
                break;
            };
            self.apply_encoder_instruction(instr)?;
            offset += consumed;
        }
        Ok(offset)
    }

    /// Decode a complete field-line block. `Ok(Blocked { .. })` means the
    /// caller must retry later with the identical `data` once
    /// [`Self::insert_count`] has caught up.
    pub fn decode_header_block(&self, data: &[u8]) -> Result<DecodeOutcome, QpackError> {
        let (prefix, consumed) = block_prefix::decode(data, self.table.insert_count(), self.table.capacity())?
            .ok_or_else(|| QpackError::DecompressionFailed("truncated header block prefix".into()))?;

        if prefix.required_insert_count > self.table.insert_count() {
            return Ok(DecodeOutcome::Blocked { required_insert_count: prefix.required_insert_count });
        }

        let base = prefix.base;
        let mut fields = Vec::new();
        let mut offset = consumed;
        while offset < data.len() {
            let (field, advanced) = self.decode_representation(&data[offset..], base)?;
            fields.push(field);
            offset += advanced;
        }
        Ok(DecodeOutcome::Done { fields, required_insert_count: prefix.required_insert_count })
    }

    fn dynamic_field(&self, absolute_index: u64) -> Result<HeaderField, QpackError> {
        self.table
            .get(absolute_index)
            .cloned()
            .ok_or_else(|| QpackError::DecompressionFailed(format!("dynamic index {absolute_index} not found")))
    }

    fn decode_representation(&self, data: &[u8], base: u64) -> Result<(HeaderField, usize), QpackError> {
        let incomplete = || QpackError::DecompressionFailed("truncated field line representation".into());
        let first = *data.first().ok_or_else(incomplete)?;

        if first & 0b1000_0000 != 0 {
            // §4.5.2 Indexed Field Line: 1 T Index(6)
            let is_static = first & 0b0100_0000 != 0;
            let (index, consumed) = prefix_int::decode_from_slice(data, 6)?.ok_or_else(incomplete)?;
            let field = if is_static {
                let (n, v) = static_table::get(index as usize)
                    .ok_or_else(|| QpackError::DecompressionFailed(format!("static index {index} out of range")))?;
                HeaderField::new(n.as_bytes().to_vec(), v.as_bytes().to_vec())
            } else {
                let abs = base
                    .checked_sub(1 + index)
                    .ok_or_else(|| QpackError::DecompressionFailed("pre-base index underflow".into()))?;
                self.dynamic_field(abs)?
            };
            Ok((field, consumed))
        } else if first & 0b0100_0000 != 0 {
            // §4.5.4 Literal Field Line With Name Reference: 01 N T Index(4)
            let is_static = first & 0b0001_0000 != 0;
            let (index, n_consumed) = prefix_int::decode_from_slice(data, 4)?.ok_or_else(incomplete)?;
            let name = if is_static {
                static_table::get(index as usize)
                    .map(|(n, _)| Bytes::copy_from_slice(n.as_bytes()))
                    .ok_or_else(|| QpackError::DecompressionFailed(format!("static index {index} out of range")))?
            } else {
                let abs = base
                    .checked_sub(1 + index)
                    .ok_or_else(|| QpackError::DecompressionFailed("pre-base index underflow".into()))?;
                self.dynamic_field(abs)?.name
            };
            let (value, _huff, v_consumed) = super::literal::decode_value(&data[n_consumed..])?.ok_or_else(incomplete)?;
            Ok((HeaderField::new(name, value), n_consumed + v_consumed))
        } else if first & 0b0010_0000 != 0 {
            // §4.5.6 Literal Field Line With Literal Name: 001 N H NameLen(3)
            let (name, _huff, n_consumed) = super::literal::decode(data, 3, 0x08)?.ok_or_else(incomplete)?;
            let (value, _huff2, v_consumed) = super::literal::decode_value(&data[n_consumed..])?.ok_or_else(incomplete)?;
            Ok((HeaderField::new(name, value), n_consumed + v_consumed))
        } else if first & 0b0001_0000 != 0 {
            // §4.5.3 Indexed Field Line With Post-Base Index: 0001 Index(4)
            let (index, consumed) = prefix_int::decode_from_slice(data, 4)?.ok_or_else(incomplete)?;
            let field = self.dynamic_field(base + index)?;
            Ok((field, consumed))
        } else {
            // §4.5.5 Literal Field Line With Post-Base Name Reference: 0000 N Index(3)
            let (index, n_consumed) = prefix_int::decode_from_slice(data, 3)?.ok_or_else(incomplete)?;
            let name = self.dynamic_field(base + index)?.name;
            let (value, _huff, v_consumed) = super::literal::decode_value(&data[n_consumed..])?.ok_or_else(incomplete)?;
            Ok((HeaderField::new(name, value), n_consumed + v_consumed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qpack::encoder::QpackEncoder;
    use bytes::BytesMut as _BytesMut;

    fn fields(pairs: &[(&str, &str)]) -> Vec<HeaderField> {
        pairs.iter().map(|&(n, v)| HeaderField::new(n.as_bytes().to_vec(), v.as_bytes().to_vec())).collect()
    }

    fn drive_instructions(decoder: &mut QpackDecoder, data: &[u8]) {
        let consumed = decoder.decode_encoder_stream(data).unwrap();
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn pure_static_block_needs_no_table_state() {
        let mut encoder = QpackEncoder::new(4096, 16);
        let decoder = QpackDecoder::new(4096);
        let hs = fields(&[(":method", "GET"), (":scheme", "https")]);
        let out = encoder.encode_header_block(1, &hs).unwrap();
        match decoder.decode_header_block(&out.field_line_block).unwrap() {
            DecodeOutcome::Done { fields: decoded, .. } => assert_eq!(decoded, hs),
            DecodeOutcome::Blocked { .. } => panic!("static-only block should never block"),
        }
    }

    #[test]
    fn blocks_until_encoder_stream_catches_up() {
        let mut encoder = QpackEncoder::new(4096, 16);
        let mut decoder = QpackDecoder::new(4096);
        let hs = fields(&[("x-custom", "value")]);
        let out = encoder.encode_header_block(1, &hs).unwrap();
        assert!(!out.encoder_stream_instructions.is_empty());

        match decoder.decode_header_block(&out.field_line_block).unwrap() {
            DecodeOutcome::Blocked { required_insert_count } => assert_eq!(required_insert_count, 1),
            DecodeOutcome::Done { .. } => panic!("must block before the insertion arrives"),
        }

        drive_instructions(&mut decoder, &out.encoder_stream_instructions);
        match decoder.decode_header_block(&out.field_line_block).unwrap() {
            DecodeOutcome::Done { fields: decoded, .. } => assert_eq!(decoded, hs),
            DecodeOutcome::Blocked { .. } => panic!("should resolve once table catches up"),
        }
    }

    #[test]
    fn explicit_post_base_indexed_field_line_decodes() {
        // Hand-build a block the reference encoder never emits: a single
        // post-base indexed field line referencing an entry inserted by
        // this very block.
        let mut decoder = QpackDecoder::new(4096);
        decoder
            .apply_encoder_instruction(EncoderInstruction::InsertWithoutNameReference {
                name: Bytes::from_static(b"x-demo"),
                value: Bytes::from_static(b"v"),
            })
            .unwrap();
        // Required Insert Count = 1 (references the entry at abs index 0),
        // Base = 0 (before that insertion) so the reference is post-base.
        let mut body = _BytesMut::new();
        block_prefix::encode(&mut body, 1, 0, 4096);
        // Indexed Field Line With Post-Base Index, Index(4) = 0: "0001 0000"
        body.extend_from_slice(&[0b0001_0000]);
        match decoder.decode_header_block(&body).unwrap() {
            DecodeOutcome::Done { fields, .. } => {
                assert_eq!(fields, vec![HeaderField::new(b"x-demo".to_vec(), b"v".to_vec())]);
            }
            DecodeOutcome::Blocked { .. } => panic!("insertion already applied, must not block"),
        }
    }
}
