//! The SETTINGS frame payload (RFC 9114 §7.2.4): a flat sequence of
//! `(identifier, value)` varint pairs. spec.md §4.4 "SETTINGS exchange".

use bytes::{BufMut, BytesMut};

use crate::error::Result;
use crate::varint;

/// RFC 9204 §5.
pub const QPACK_MAX_TABLE_CAPACITY: u64 = 0x01;
/// RFC 9114 §7.2.4.1.
pub const MAX_FIELD_SECTION_SIZE: u64 = 0x06;
/// RFC 9204 §5.
pub const QPACK_BLOCKED_STREAMS: u64 = 0x07;
/// RFC 9220 §3.
pub const ENABLE_CONNECT_PROTOCOL: u64 = 0x08;
/// Implementation extension (spec.md §4.4): not a registered RFC 9114
/// setting ID, but accepted the same way unknown IDs are — chosen from the
/// unassigned range, well clear of the GREASE pattern `0x1f * N + 0x21`.
pub const ENABLE_PUSH: u64 = 0x0ff0;
/// Implementation extension (spec.md §4.4 "MAX_CONCURRENT_STREAMS
/// (implementation extension)").
pub const MAX_CONCURRENT_STREAMS: u64 = 0x0ff1;

/// Negotiated connection settings, applied immediately upon receipt
/// (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub qpack_max_table_capacity: u64,
    pub max_field_section_size: Option<u64>,
    pub qpack_blocked_streams: u64,
    pub enable_connect_protocol: bool,
    pub enable_push: bool,
    pub max_concurrent_streams: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            qpack_max_table_capacity: 4096,
            max_field_section_size: None,
            qpack_blocked_streams: 16,
            enable_connect_protocol: false,
            enable_push: true,
            max_concurrent_streams: 100,
        }
    }
}

impl Settings {
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut put = |id: u64, value: u64| {
            varint::encode(buf, id);
            varint::encode(buf, value);
        };
        put(QPACK_MAX_TABLE_CAPACITY, self.qpack_max_table_capacity);
        if let Some(max) = self.max_field_section_size {
            put(MAX_FIELD_SECTION_SIZE, max);
        }
        put(QPACK_BLOCKED_STREAMS, self.qpack_blocked_streams);
        put(ENABLE_CONNECT_PROTOCOL, self.enable_connect_protocol as u64);
        put(ENABLE_PUSH, self.enable_push as u64);
        put(MAX_CONCURRENT_STREAMS, self.max_concurrent_streams);
    }

    /// Parse a complete SETTINGS payload. Unrecognized identifiers are
    /// ignored, per spec.md §4.4.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let mut settings = Self { max_field_section_size: None, ..Self::default() };
        // Defaults above would mask "not present" for booleans that default
        // true/false; re-zero what RFC 9114 actually defines a default for
        // (push defaults to enabled only once ENABLE_PUSH is seen) — but
        // per spec.md semantics settings "apply immediately upon receipt",
        // so start from the conservative off/zero state instead of
        // `Settings::default()` and only raise values this payload sets.
        settings.qpack_max_table_capacity = 0;
        settings.qpack_blocked_streams = 0;
        settings.enable_connect_protocol = false;
        settings.enable_push = false;
        settings.max_concurrent_streams = 100;

        while !data.is_empty() {
            let id = varint::decode(&mut data)?;
            let value = varint::decode(&mut data)?;
            match id {
                QPACK_MAX_TABLE_CAPACITY => settings.qpack_max_table_capacity = value,
                MAX_FIELD_SECTION_SIZE => settings.max_field_section_size = Some(value),
                QPACK_BLOCKED_STREAMS => settings.qpack_blocked_streams = value,
                ENABLE_CONNECT_PROTOCOL => settings.enable_connect_protocol = value != 0,
                ENABLE_PUSH => settings.enable_push = value != 0,
                MAX_CONCURRENT_STREAMS => settings.max_concurrent_streams = value,
                _ => {} // unknown IDs are ignored, RFC 9114 §7.2.4
            }
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_encode_decode() {
        let settings = Settings {
            qpack_max_table_capacity: 8192,
            max_field_section_size: Some(65536),
            qpack_blocked_streams: 32,
            enable_connect_protocol: true,
            enable_push: false,
            max_concurrent_streams: 250,
        };
        let mut buf = BytesMut::new();
        settings.encode(&mut buf);
        let decoded = Settings::decode(&buf).unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn unknown_identifiers_are_ignored() {
        let mut buf = BytesMut::new();
        varint::encode(&mut buf, 0x2f); // GREASE-ish unknown ID
        varint::encode(&mut buf, 42);
        varint::encode(&mut buf, QPACK_BLOCKED_STREAMS);
        varint::encode(&mut buf, 16);
        let decoded = Settings::decode(&buf).unwrap();
        assert_eq!(decoded.qpack_blocked_streams, 16);
    }
}
