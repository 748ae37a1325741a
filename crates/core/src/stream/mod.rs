//! Stream state machines (spec.md §4.2): per-stream frame assembly and
//! ordering rules, kept sans-IO — each submodule exposes a pure struct
//! that consumes bytes and yields events, leaving the actual socket I/O
//! and the QPACK table lookups (which need connection-wide state) to
//! [`crate::connection`]. The split mirrors how the `h2-sans-io` example
//! in the pack separates protocol state from transport, and how
//! [`crate::qpack::decoder::QpackDecoder`] already separates "parse a
//! block" from "the caller decides what blocked means".

pub mod control;
pub mod push;
pub mod qpack_streams;
pub mod request;
pub mod unidentified;

/// Which side of the connection a stream object is running on —
/// determines which ordering rules apply (e.g. only a client's response
/// stream may carry PUSH_PROMISE, spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The six stream kinds of spec.md §3 "Stream", plus the transient
/// wrapper that precedes identification of an inbound unidirectional
/// stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    RequestBidi,
    ControlUni,
    PushUni,
    QpackEncoderUni,
    QpackDecoderUni,
    UnidentifiedUni,
}

pub use crate::frame::{TYPE_CANCEL_PUSH, TYPE_GOAWAY, TYPE_MAX_PUSH_ID};

/// Unidirectional stream type codes (spec.md §4.2 "Unidentified
/// unidirectional stream"), RFC 9114 §6.2 / RFC 9204 §4.2.
pub const UNI_STREAM_TYPE_CONTROL: u64 = 0x00;
pub const UNI_STREAM_TYPE_PUSH: u64 = 0x01;
pub const UNI_STREAM_TYPE_QPACK_ENCODER: u64 = 0x02;
pub const UNI_STREAM_TYPE_QPACK_DECODER: u64 = 0x03;
