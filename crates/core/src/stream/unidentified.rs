//! The transient "unidentified" unidirectional stream (spec.md §4.2):
//! every inbound uni stream starts here. Buffers bytes until the leading
//! stream-type varint is complete, then hands back the type plus
//! whatever bytes were read past it, so the caller can replay them as the
//! new stream object's first input without losing data already pulled
//! off the wire.

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use crate::varint;

/// Feed newly read bytes in; once the type varint is complete, returns
/// `Some((stream_type, leftover))` where `leftover` is whatever came after
/// the varint in this same read and must be replayed to the stream object
/// that gets constructed for `stream_type`. Returns `None` while still
/// buffering a partial varint — keep reading and feeding.
#[derive(Default)]
pub struct TypeSniffer {
    buf: BytesMut,
}

impl TypeSniffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<Option<(u64, Bytes)>> {
        self.buf.extend_from_slice(data);
        let Some(len) = varint::peek_len(&self.buf) else { return Ok(None) };
        if self.buf.len() < len {
            return Ok(None);
        }
        let mut head = self.buf.split_to(len);
        let stream_type = varint::decode(&mut head)?;
        let leftover = self.buf.split_off(0).freeze();
        Ok(Some((stream_type, leftover)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_type_and_replays_leftover_bytes() {
        let mut sniffer = TypeSniffer::new();
        let mut buf = BytesMut::new();
        varint::encode(&mut buf, 0x02); // QPACK encoder stream
        buf.extend_from_slice(b"rest-of-payload");
        let (stream_type, leftover) = sniffer.feed(&buf).unwrap().unwrap();
        assert_eq!(stream_type, 0x02);
        assert_eq!(&leftover[..], b"rest-of-payload");
    }

    #[test]
    fn buffers_a_varint_split_across_reads() {
        // A 2-byte-class varint (value >= 64) forces the type byte itself
        // to arrive across two separate `feed` calls.
        let mut sniffer = TypeSniffer::new();
        let mut buf = BytesMut::new();
        varint::encode(&mut buf, 12345);
        assert_eq!(sniffer.feed(&buf[..1]).unwrap(), None);
        let (stream_type, leftover) = sniffer.feed(&buf[1..]).unwrap().unwrap();
        assert_eq!(stream_type, 12345);
        assert!(leftover.is_empty());
    }

    #[test]
    fn unknown_type_is_identified_like_any_other() {
        let mut sniffer = TypeSniffer::new();
        let mut buf = BytesMut::new();
        varint::encode(&mut buf, 0x21); // reserved/grease type
        let (stream_type, leftover) = sniffer.feed(&buf).unwrap().unwrap();
        assert_eq!(stream_type, 0x21);
        assert!(leftover.is_empty());
    }
}
