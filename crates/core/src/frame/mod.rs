//! HTTP/3 frame codec (RFC 9114 §7.2, spec.md §6.2): `type-varint ||
//! length-varint || payload`. Frame payloads that themselves carry a QPACK
//! header block (HEADERS, PUSH_PROMISE) are left as opaque bytes here —
//! decoding them is [`crate::qpack::decoder::QpackDecoder`]'s job, since it
//! alone owns the dynamic-table state needed to do so.

pub mod settings;

use bytes::{Bytes, BytesMut};

pub use settings::Settings;

use crate::error::Result;
use crate::varint;

pub const TYPE_DATA: u64 = 0x00;
pub const TYPE_HEADERS: u64 = 0x01;
pub const TYPE_CANCEL_PUSH: u64 = 0x03;
pub const TYPE_SETTINGS: u64 = 0x04;
pub const TYPE_PUSH_PROMISE: u64 = 0x05;
pub const TYPE_GOAWAY: u64 = 0x07;
pub const TYPE_MAX_PUSH_ID: u64 = 0x0d;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Bytes),
    /// An encoded QPACK header block, opaque at this layer.
    Headers(Bytes),
    CancelPush { push_id: u64 },
    Settings(Settings),
    PushPromise { push_id: u64, header_block: Bytes },
    Goaway { id: u64 },
    MaxPushId { push_id: u64 },
    /// Any frame type this implementation does not recognize. Must be
    /// skipped, never treated as an error (RFC 9114 §9).
    Unknown { frame_type: u64, payload: Bytes },
}

impl Frame {
    pub fn frame_type(&self) -> u64 {
        match self {
            Self::Data(_) => TYPE_DATA,
            Self::Headers(_) => TYPE_HEADERS,
            Self::CancelPush { .. } => TYPE_CANCEL_PUSH,
            Self::Settings(_) => TYPE_SETTINGS,
            Self::PushPromise { .. } => TYPE_PUSH_PROMISE,
            Self::Goaway { .. } => TYPE_GOAWAY,
            Self::MaxPushId { .. } => TYPE_MAX_PUSH_ID,
            Self::Unknown { frame_type, .. } => *frame_type,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let mut payload = BytesMut::new();
        match self {
            Self::Data(data) => payload.extend_from_slice(data),
            Self::Headers(block) => payload.extend_from_slice(block),
            Self::CancelPush { push_id } => varint::encode(&mut payload, *push_id),
            Self::Settings(settings) => settings.encode(&mut payload),
            Self::PushPromise { push_id, header_block } => {
                varint::encode(&mut payload, *push_id);
                payload.extend_from_slice(header_block);
            }
            Self::Goaway { id } => varint::encode(&mut payload, *id),
            Self::MaxPushId { push_id } => varint::encode(&mut payload, *push_id),
            Self::Unknown { payload: p, .. } => payload.extend_from_slice(p),
        }
        varint::encode(buf, self.frame_type());
        varint::encode(buf, payload.len() as u64);
        buf.extend_from_slice(&payload);
    }

    /// Parse one complete frame from the front of `data`. `Ok(None)` means
    /// the type/length/payload aren't all buffered yet — never an error.
    pub fn decode(data: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some((frame_type, type_len)) = try_varint(data)? else { return Ok(None) };
        let Some((length, len_len)) = try_varint(&data[type_len..])? else { return Ok(None) };
        let header_len = type_len + len_len;
        let length = length as usize;
        if data.len() < header_len + length {
            return Ok(None);
        }
        let payload = &data[header_len..header_len + length];
        let total = header_len + length;

        let frame = match frame_type {
            TYPE_DATA => Self::Data(Bytes::copy_from_slice(payload)),
            TYPE_HEADERS => Self::Headers(Bytes::copy_from_slice(payload)),
            TYPE_CANCEL_PUSH => Self::CancelPush { push_id: read_single_varint(payload)? },
            TYPE_SETTINGS => Self::Settings(Settings::decode(payload)?),
            TYPE_PUSH_PROMISE => {
                let Some((push_id, consumed)) = try_varint(payload)? else {
                    return Err(crate::error::Error::other("truncated PUSH_PROMISE push id"));
                };
                Self::PushPromise {
                    push_id,
                    header_block: Bytes::copy_from_slice(&payload[consumed..]),
                }
            }
            TYPE_GOAWAY => Self::Goaway { id: read_single_varint(payload)? },
            TYPE_MAX_PUSH_ID => Self::MaxPushId { push_id: read_single_varint(payload)? },
            other => Self::Unknown { frame_type: other, payload: Bytes::copy_from_slice(payload) },
        };
        Ok(Some((frame, total)))
    }
}

fn try_varint(data: &[u8]) -> Result<Option<(u64, usize)>> {
    let Some(len) = varint::peek_len(data) else { return Ok(None) };
    if data.len() < len {
        return Ok(None);
    }
    let mut slice = &data[..len];
    let value = varint::decode(&mut slice)?;
    Ok(Some((value, len)))
}

fn read_single_varint(payload: &[u8]) -> Result<u64> {
    let mut slice = payload;
    Ok(varint::decode(&mut slice)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let (decoded, consumed) = Frame::decode(&buf).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn roundtrips_every_known_frame_type() {
        roundtrip(Frame::Data(Bytes::from_static(b"hello")));
        roundtrip(Frame::Headers(Bytes::from_static(b"qpack-bytes")));
        roundtrip(Frame::CancelPush { push_id: 7 });
        roundtrip(Frame::Settings(Settings::default()));
        roundtrip(Frame::PushPromise { push_id: 3, header_block: Bytes::from_static(b"hdrs") });
        roundtrip(Frame::Goaway { id: 12 });
        roundtrip(Frame::MaxPushId { push_id: 99 });
        roundtrip(Frame::Unknown { frame_type: 0x21, payload: Bytes::from_static(b"grease") });
    }

    #[test]
    fn incomplete_frame_reports_none() {
        let mut buf = BytesMut::new();
        Frame::Data(Bytes::from_static(b"hello world")).encode(&mut buf);
        for cut in 1..buf.len() {
            assert_eq!(Frame::decode(&buf[..cut]).unwrap(), None);
        }
    }

    #[test]
    fn unknown_frame_type_is_not_an_error() {
        let mut buf = BytesMut::new();
        Frame::Unknown { frame_type: 0x40, payload: Bytes::from_static(b"ext") }.encode(&mut buf);
        let (decoded, _) = Frame::decode(&buf).unwrap().unwrap();
        assert_eq!(decoded, Frame::Unknown { frame_type: 0x40, payload: Bytes::from_static(b"ext") });
    }
}
