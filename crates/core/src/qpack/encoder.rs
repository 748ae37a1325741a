//! The QPACK encoder (RFC 9204 §2.1, spec.md §4.1 "Encoding a header
//! block"): turns a list of header fields into a field-line block plus
//! whatever encoder-stream instructions are needed to prime the dynamic
//! table for it.
//!
//! To keep the risk of blocking bounded, every dynamic-table reference this
//! encoder emits is resolved against the table state *before* this block's
//! own insertions land, so `Base` is always `>= RequiredInsertCount` and
//! every reference is pre-base — this encoder never emits the post-base
//! representations (RFC 9204 §4.5.3 / §4.5.5), even though the decoder
//! below understands them for interoperability with other encoders.

use std::collections::HashSet;

use bytes::{BufMut, Bytes, BytesMut};

use super::{block_prefix, instructions::EncoderInstruction, static_table, DynamicTable, HeaderField, QpackError};

/// Output of [`QpackEncoder::encode_header_block`].
pub struct EncodedHeaderBlock {
    /// Goes on the request/push stream, immediately after the frame header.
    pub field_line_block: Bytes,
    /// Goes on the encoder stream, if non-empty, *before* the field line
    /// block is allowed to be processed by the peer's decoder.
    pub encoder_stream_instructions: Bytes,
}

enum Pending {
    IndexedStatic(usize),
    IndexedDynamic(u64),
    LiteralNameRefStatic { index: usize, value: Bytes },
    LiteralNameRefDynamic { index: u64, value: Bytes },
    LiteralLiteral { name: Bytes, value: Bytes },
}

pub struct QpackEncoder {
    table: DynamicTable,
    /// Lowest insert count we know the peer's decoder has observed, via
    /// Insert Count Increment and Section Acknowledgement feedback.
    known_received_count: u64,
    /// `SETTINGS_QPACK_BLOCKED_STREAMS` as advertised by the peer.
    max_blocked_streams: usize,
    /// Streams with at least one outstanding field-line block referencing
    /// an entry the peer hasn't acknowledged yet.
    blocked_streams: HashSet<u64>,
    /// Per stream, the most recently sent not-yet-acknowledged block's
    /// required insert count and the dynamic entries it referenced, so a
    /// Section Acknowledgement or Stream Cancellation can release them.
    outstanding: std::collections::HashMap<u64, (u64, Vec<u64>)>,
}

impl QpackEncoder {
    pub fn new(max_table_capacity: usize, max_blocked_streams: usize) -> Self {
        Self {
            table: DynamicTable::new(max_table_capacity),
            known_received_count: 0,
            max_blocked_streams,
            blocked_streams: HashSet::new(),
            outstanding: std::collections::HashMap::new(),
        }
    }

    pub fn dynamic_table_capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Update `SETTINGS_QPACK_BLOCKED_STREAMS` once the peer's SETTINGS
    /// frame has been received (spec.md §4.4 "Setting values apply
    /// immediately upon receipt").
    pub fn set_max_blocked_streams(&mut self, max_blocked_streams: usize) {
        self.max_blocked_streams = max_blocked_streams;
    }

    /// Negotiate the dynamic table's working capacity (bounded by the
    /// constructor's `max_table_capacity`). Returns the encoder-stream
    /// instruction bytes to send.
    pub fn set_dynamic_table_capacity(&mut self, capacity: usize) -> Result<Bytes, QpackError> {
        self.table.set_capacity(capacity)?;
        let mut buf = BytesMut::new();
        EncoderInstruction::SetDynamicTableCapacity { capacity: capacity as u64 }.encode(&mut buf);
        Ok(buf.freeze())
    }

    /// RFC 9204 §4.4.3: the decoder has processed insertions up to this
    /// many beyond what we already knew about.
    pub fn on_insert_count_increment(&mut self, increment: u64) -> Result<(), QpackError> {
        let new_count = self.known_received_count + increment;
        if new_count > self.table.insert_count() {
            return Err(QpackError::DecoderStreamError(
                "insert count increment exceeds total insertions".into(),
            ));
        }
        self.known_received_count = new_count;
        Ok(())
    }

    /// RFC 9204 §4.4.1: the decoder has fully processed `stream_id`'s most
    /// recent block. Implicitly acknowledges its Required Insert Count and
    /// releases the entries it referenced.
    pub fn on_section_acknowledgement(&mut self, stream_id: u64) -> Result<(), QpackError> {
        let Some((ric, referenced)) = self.outstanding.remove(&stream_id) else {
            return Err(QpackError::DecoderStreamError(format!(
                "section acknowledgement for stream {stream_id} with no outstanding block"
            )));
        };
        if ric > self.known_received_count {
            self.known_received_count = ric;
        }
        for index in referenced {
            self.table.release_ref(index);
        }
        self.blocked_streams.remove(&stream_id);
        Ok(())
    }

    /// RFC 9204 §4.4.2: the stream was reset; release its references
    /// without treating its Required Insert Count as acknowledged.
    pub fn on_stream_cancellation(&mut self, stream_id: u64) {
        if let Some((_ric, referenced)) = self.outstanding.remove(&stream_id) {
            for index in referenced {
                self.table.release_ref(index);
            }
        }
        self.blocked_streams.remove(&stream_id);
    }

    fn can_risk_blocking(&self, stream_id: u64) -> bool {
        self.blocked_streams.contains(&stream_id) || self.blocked_streams.len() < self.max_blocked_streams
    }

    pub fn encode_header_block(
        &mut self,
        stream_id: u64,
        fields: &[HeaderField],
    ) -> Result<EncodedHeaderBlock, QpackError> {
        let mut pending = Vec::with_capacity(fields.len());
        let mut instructions = BytesMut::new();
        let mut referenced_dynamic: Vec<u64> = Vec::new();
        let mut will_block = false;

        for field in fields {
            let name = std::str::from_utf8(&field.name).ok();
            let value = std::str::from_utf8(&field.value).ok();

            if let Some(abs) = self.table.find(&field.name, &field.value) {
                let known = abs < self.known_received_count;
                if known || self.can_risk_blocking(stream_id) {
                    if !known {
                        will_block = true;
                        self.table.add_ref(abs);
                        referenced_dynamic.push(abs);
                    }
                    pending.push(Pending::IndexedDynamic(abs));
                    continue;
                }
            }

            if let (Some(n), Some(v)) = (name, value) {
                if let Some(idx) = static_table::find_name_value(n, v) {
                    pending.push(Pending::IndexedStatic(idx));
                    continue;
                }
            }

            // No exact match. Decide whether to add this field to the
            // dynamic table for future reuse.
            let entry_size = field.size();
            let fits = entry_size <= self.table.capacity();
            if fits && self.can_risk_blocking(stream_id) {
                let instr = match name.and_then(|n| static_table::find_name(n)) {
                    Some(static_index) => EncoderInstruction::InsertWithNameReference {
                        static_table: true,
                        name_index: static_index as u64,
                        value: field.value.clone(),
                    },
                    None => match self.table.find_name(&field.name) {
                        Some(dyn_index) => EncoderInstruction::InsertWithNameReference {
                            static_table: false,
                            name_index: self.table.insert_count() - 1 - dyn_index,
                            value: field.value.clone(),
                        },
                        None => EncoderInstruction::InsertWithoutNameReference {
                            name: field.name.clone(),
                            value: field.value.clone(),
                        },
                    },
                };
                if let Some(new_index) = self.table.insert(field.clone()) {
                    instr.encode(&mut instructions);
                    will_block = true;
                    self.table.add_ref(new_index);
                    referenced_dynamic.push(new_index);
                    pending.push(Pending::IndexedDynamic(new_index));
                    continue;
                }
            }

            // Fall back to a literal, preferring a name reference.
            if let (Some(n), _) = (name, value) {
                if let Some(static_index) = static_table::find_name(n) {
                    pending.push(Pending::LiteralNameRefStatic {
                        index: static_index,
                        value: field.value.clone(),
                    });
                    continue;
                }
            }
            if let Some(dyn_index) = self.table.find_name(&field.name) {
                let known = dyn_index < self.known_received_count;
                if known || self.can_risk_blocking(stream_id) {
                    if !known {
                        will_block = true;
                        self.table.add_ref(dyn_index);
                        referenced_dynamic.push(dyn_index);
                    }
                    pending.push(Pending::LiteralNameRefDynamic { index: dyn_index, value: field.value.clone() });
                    continue;
                }
            }
            pending.push(Pending::LiteralLiteral { name: field.name.clone(), value: field.value.clone() });
        }

        let base = self.table.insert_count();
        let required_insert_count =
            referenced_dynamic.iter().copied().max().map(|m| m + 1).unwrap_or(0);

        let mut body = BytesMut::new();
        block_prefix::encode(&mut body, required_insert_count, base, self.table.capacity());
        for rep in pending {
            match rep {
                Pending::IndexedStatic(index) => {
                    super::prefix_int::encode(&mut body, 6, 0b1100_0000, index as u64);
                }
                Pending::IndexedDynamic(abs) => {
                    let relative = base - 1 - abs;
                    super::prefix_int::encode(&mut body, 6, 0b1000_0000, relative);
                }
                Pending::LiteralNameRefStatic { index, value } => {
                    super::prefix_int::encode(&mut body, 4, 0b0101_0000, index as u64);
                    super::literal::encode_value(&mut body, &value);
                }
                Pending::LiteralNameRefDynamic { index, value } => {
                    let relative = base - 1 - index;
                    super::prefix_int::encode(&mut body, 4, 0b0100_0000, relative);
                    super::literal::encode_value(&mut body, &value);
                }
                Pending::LiteralLiteral { name, value } => {
                    super::literal::encode(&mut body, 3, 0b0010_0000, 0x08, &name);
                    super::literal::encode_value(&mut body, &value);
                }
            }
        }

        if will_block {
            self.blocked_streams.insert(stream_id);
            self.outstanding.insert(stream_id, (required_insert_count, referenced_dynamic));
        }

        Ok(EncodedHeaderBlock {
            field_line_block: body.freeze(),
            encoder_stream_instructions: instructions.freeze(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qpack::decoder::{DecodeOutcome, QpackDecoder};

    fn fields(pairs: &[(&str, &str)]) -> Vec<HeaderField> {
        pairs.iter().map(|&(n, v)| HeaderField::new(n.as_bytes().to_vec(), v.as_bytes().to_vec())).collect()
    }

    #[test]
    fn pure_static_block_needs_no_instructions() {
        let mut encoder = QpackEncoder::new(4096, 16);
        let out = encoder
            .encode_header_block(4, &fields(&[(":method", "GET"), (":scheme", "https")]))
            .unwrap();
        assert!(out.encoder_stream_instructions.is_empty());
        assert!(!out.field_line_block.is_empty());
    }

    #[test]
    fn novel_field_is_indexed_and_decodes_round_trip() {
        let mut encoder = QpackEncoder::new(4096, 16);
        let mut decoder = QpackDecoder::new(4096);
        let hs = fields(&[("x-custom", "hello-world")]);
        let out = encoder.encode_header_block(4, &hs).unwrap();
        assert!(!out.encoder_stream_instructions.is_empty(), "new field should be inserted");

        let mut decoded_instructions = 0;
        let mut offset = 0;
        while offset < out.encoder_stream_instructions.len() {
            let (instr, consumed) =
                super::super::instructions::EncoderInstruction::decode(&out.encoder_stream_instructions[offset..])
                    .unwrap()
                    .unwrap();
            decoder.apply_encoder_instruction(instr).unwrap();
            offset += consumed;
            decoded_instructions += 1;
        }
        assert_eq!(decoded_instructions, 1);

        match decoder.decode_header_block(&out.field_line_block).unwrap() {
            DecodeOutcome::Done { fields, .. } => {
                assert_eq!(fields, hs);
            }
            DecodeOutcome::Blocked { .. } => panic!("should not block once instructions applied"),
        }
        encoder.on_section_acknowledgement(4).unwrap();
    }

    #[test]
    fn repeated_field_reuses_dynamic_entry_without_reinserting() {
        let mut encoder = QpackEncoder::new(4096, 16);
        let hs = fields(&[("x-custom", "hello-world")]);
        let first = encoder.encode_header_block(1, &hs).unwrap();
        encoder.on_section_acknowledgement(1).unwrap();
        let second = encoder.encode_header_block(2, &hs).unwrap();
        assert!(!first.encoder_stream_instructions.is_empty());
        assert!(second.encoder_stream_instructions.is_empty(), "entry already known to decoder");
    }

    #[test]
    fn blocked_stream_budget_is_respected() {
        let mut encoder = QpackEncoder::new(4096, 1);
        let a = encoder.encode_header_block(1, &fields(&[("x-a", "1")])).unwrap();
        assert!(!a.encoder_stream_instructions.is_empty());
        // Stream 1 is now the sole blocked-budget occupant (unacked).
        // A second distinct novel field on a different stream must not
        // also risk blocking past the negotiated limit.
        let b = encoder.encode_header_block(2, &fields(&[("x-b", "2")])).unwrap();
        assert!(b.encoder_stream_instructions.is_empty(), "budget exhausted, must fall back to literal");
    }
}
