//! Buffering for the two QPACK sideband streams (spec.md §4.2 "Control
//! stream (send and recv...)" applies equally to these; §4.1 "Encoder-stream
//! instructions" / "Decoder-stream instructions"). Both directions just
//! accumulate bytes and hand back as many complete instructions as have
//! arrived — the actual state transition (mutating the dynamic table, or
//! advancing `known_received_count`) happens in [`crate::qpack`].

use bytes::BytesMut;

use crate::error::{Error, ErrorScope, H3Code, H3Error};
use crate::qpack::instructions::{DecoderInstruction, EncoderInstruction};
use crate::qpack::QpackError;

#[derive(Default)]
pub struct EncoderStreamReader {
    buf: BytesMut,
}

impl EncoderStreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes in and return every complete instruction parsed so far.
    /// A malformed instruction is connection-fatal — the encoder stream is
    /// a critical stream (spec.md §4.2 "Failure policy").
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<EncoderInstruction>, Error> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            match EncoderInstruction::decode(&self.buf[offset..]).map_err(qpack_connection_error)? {
                None => break,
                Some((instr, consumed)) => {
                    out.push(instr);
                    offset += consumed;
                }
            }
        }
        let _ = self.buf.split_to(offset);
        Ok(out)
    }
}

#[derive(Default)]
pub struct DecoderStreamReader {
    buf: BytesMut,
}

impl DecoderStreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<DecoderInstruction>, Error> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            match DecoderInstruction::decode(&self.buf[offset..]).map_err(qpack_connection_error)? {
                None => break,
                Some((instr, consumed)) => {
                    out.push(instr);
                    offset += consumed;
                }
            }
        }
        let _ = self.buf.split_to(offset);
        Ok(out)
    }
}

fn qpack_connection_error(e: QpackError) -> Error {
    let code = H3Code::from_qpack(e);
    Error::Protocol(H3Error { code, scope: ErrorScope::Connection })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut as _BytesMut;

    #[test]
    fn reassembles_instructions_split_across_feeds() {
        let mut reader = EncoderStreamReader::new();
        let mut buf = _BytesMut::new();
        EncoderInstruction::Duplicate { relative_index: 3 }.encode(&mut buf);
        let split = buf.len() / 2;
        assert!(reader.feed(&buf[..split]).unwrap().is_empty());
        let instrs = reader.feed(&buf[split..]).unwrap();
        assert_eq!(instrs, vec![EncoderInstruction::Duplicate { relative_index: 3 }]);
    }

    #[test]
    fn decoder_stream_reassembles_too() {
        let mut reader = DecoderStreamReader::new();
        let mut buf = _BytesMut::new();
        DecoderInstruction::SectionAcknowledgement { stream_id: 4 }.encode(&mut buf);
        DecoderInstruction::InsertCountIncrement { increment: 2 }.encode(&mut buf);
        let instrs = reader.feed(&buf).unwrap();
        assert_eq!(
            instrs,
            vec![
                DecoderInstruction::SectionAcknowledgement { stream_id: 4 },
                DecoderInstruction::InsertCountIncrement { increment: 2 },
            ]
        );
    }
}
