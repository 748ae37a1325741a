//! Error types for the HTTP/3 engine.
//!
//! Mirrors the taxonomy of RFC 9114 §8 (application error codes) and
//! RFC 9204 §6 (QPACK error codes). [`H3Code`]/[`QpackCode`] carry the wire
//! error code an endpoint sends on `RESET_STREAM`/`STOP_SENDING` or on
//! connection close; [`Error`] is the crate-boundary type that wraps these
//! plus I/O and decode failures, following the hand-rolled aggregate-enum
//! shape the teacher uses at its own crate boundary rather than a single
//! `thiserror` derive.

use std::fmt;

use crate::qpack::QpackError;
use crate::varint::VarintError;

/// HTTP/3 connection-level error codes, RFC 9114 §8.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum H3Code {
    NoError,
    GeneralProtocolError,
    InternalError,
    StreamCreationError,
    ClosedCriticalStream,
    FrameUnexpected,
    FrameError,
    ExcessiveLoad,
    IdError,
    SettingsError,
    MissingSettings,
    RequestRejected,
    RequestCancelled,
    RequestIncomplete,
    MessageError,
    ConnectError,
    VersionFallback,
    QpackDecompressionFailed,
    QpackEncoderStreamError,
    QpackDecoderStreamError,
}

impl H3Code {
    /// The wire value, per RFC 9114 §8.1 / RFC 9204 §6.
    pub const fn code(self) -> u64 {
        match self {
            Self::NoError => 0x0100,
            Self::GeneralProtocolError => 0x0101,
            Self::InternalError => 0x0102,
            Self::StreamCreationError => 0x0103,
            Self::ClosedCriticalStream => 0x0104,
            Self::FrameUnexpected => 0x0105,
            Self::FrameError => 0x0106,
            Self::ExcessiveLoad => 0x0107,
            Self::IdError => 0x0108,
            Self::SettingsError => 0x0109,
            Self::MissingSettings => 0x010a,
            Self::RequestRejected => 0x010b,
            Self::RequestCancelled => 0x010c,
            Self::RequestIncomplete => 0x010d,
            Self::MessageError => 0x010e,
            Self::ConnectError => 0x010f,
            Self::VersionFallback => 0x0110,
            Self::QpackDecompressionFailed => 0x0200,
            Self::QpackEncoderStreamError => 0x0201,
            Self::QpackDecoderStreamError => 0x0202,
        }
    }

    pub const fn from_qpack(e: QpackError) -> Self {
        match e {
            QpackError::DecompressionFailed(_) => Self::QpackDecompressionFailed,
            QpackError::EncoderStreamError(_) => Self::QpackEncoderStreamError,
            QpackError::DecoderStreamError(_) => Self::QpackDecoderStreamError,
        }
    }
}

impl fmt::Display for H3Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} (0x{:04x})", self.code())
    }
}

/// Whether an [`H3Error`] should tear down the whole connection or just
/// reset the one stream that produced it — spec.md §4.2 "Failure policy".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Connection,
    Stream,
}

/// A protocol-level failure, tagged with the code to send on the wire and
/// whether it is connection-fatal or stream-local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H3Error {
    pub code: H3Code,
    pub scope: ErrorScope,
}

impl H3Error {
    pub const fn connection(code: H3Code) -> Self {
        Self { code, scope: ErrorScope::Connection }
    }

    pub const fn stream(code: H3Code) -> Self {
        Self { code, scope: ErrorScope::Stream }
    }
}

impl fmt::Display for H3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} error: {}", self.scope, self.code)
    }
}

impl std::error::Error for H3Error {}

impl From<QpackError> for H3Error {
    fn from(e: QpackError) -> Self {
        // Errors on the QPACK encoder/decoder streams are always critical
        // streams (spec.md §4.2) — a QPACK failure is connection-fatal.
        Self::connection(H3Code::from_qpack(e))
    }
}

/// A boxed error type for application-supplied callbacks (body providers,
/// handlers) whose concrete error type we don't know.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// The crate-boundary error type returned from fallible public APIs.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A protocol violation, already classified as connection- or
    /// stream-scoped with its wire error code.
    Protocol(H3Error),
    /// The underlying QUIC transport failed.
    Transport(BoxedError),
    /// A malformed varint was encountered while framing.
    Varint(VarintError),
    /// Router pattern was invalid (e.g. `*` not in final segment).
    Router(crate::router::RouterError),
    /// Any other error, boxed.
    Other(BoxedError),
}

impl Error {
    pub fn other(e: impl Into<BoxedError>) -> Self {
        Self::Other(e.into())
    }

    pub fn transport(e: impl Into<BoxedError>) -> Self {
        Self::Transport(e.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "{e}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Varint(e) => write!(f, "{e}"),
            Self::Router(e) => write!(f, "{e}"),
            Self::Other(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<H3Error> for Error {
    fn from(e: H3Error) -> Self {
        Self::Protocol(e)
    }
}

impl From<QpackError> for Error {
    fn from(e: QpackError) -> Self {
        Self::Protocol(e.into())
    }
}

impl From<VarintError> for Error {
    fn from(e: VarintError) -> Self {
        Self::Varint(e)
    }
}

impl From<crate::router::RouterError> for Error {
    fn from(e: crate::router::RouterError) -> Self {
        Self::Router(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_rfc9114() {
        assert_eq!(H3Code::NoError.code(), 0x0100);
        assert_eq!(H3Code::VersionFallback.code(), 0x0110);
        assert_eq!(H3Code::QpackDecompressionFailed.code(), 0x0200);
        assert_eq!(H3Code::QpackEncoderStreamError.code(), 0x0201);
        assert_eq!(H3Code::QpackDecoderStreamError.code(), 0x0202);
    }

    #[test]
    fn qpack_error_is_always_connection_scoped() {
        let e: H3Error = QpackError::DecompressionFailed("bad prefix".into()).into();
        assert_eq!(e.scope, ErrorScope::Connection);
        assert_eq!(e.code, H3Code::QpackDecompressionFailed);
    }
}
