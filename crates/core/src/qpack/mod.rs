//! QPACK header compression (RFC 9204): static+dynamic table header
//! compression with encoder/decoder sidebands and blocked-stream
//! resumption. See spec.md §4.1 / §3 for the invariants this module upholds.

pub mod block_prefix;
pub mod blocked;
pub mod dynamic_table;
pub mod encoder;
pub mod decoder;
pub mod instructions;
pub mod literal;
pub mod prefix_int;
pub mod static_table;

pub use blocked::BlockedRegistry;
pub use dynamic_table::DynamicTable;
pub use encoder::QpackEncoder;
pub use decoder::QpackDecoder;

use thiserror::Error;

/// QPACK-specific failures, tagged per RFC 9204 §6. `h3lib_core::error::H3Error`
/// maps each variant onto the connection-level wire code that must close the
/// connection (spec.md §4.1 "Failure modes").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QpackError {
    #[error("QPACK_DECOMPRESSION_FAILED: {0}")]
    DecompressionFailed(String),
    #[error("QPACK_ENCODER_STREAM_ERROR: {0}")]
    EncoderStreamError(String),
    #[error("QPACK_DECODER_STREAM_ERROR: {0}")]
    DecoderStreamError(String),
}

/// A single decoded (or about-to-be-encoded) header field. Pseudo-header
/// names begin with `:` and must sort before regular fields in a block
/// (spec.md §3 "Header block").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: bytes::Bytes,
    pub value: bytes::Bytes,
}

impl HeaderField {
    pub fn new(name: impl Into<bytes::Bytes>, value: impl Into<bytes::Bytes>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    /// RFC 9204 §3.2.1 entry size: name + value + 32 bytes overhead.
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + 32
    }
}
