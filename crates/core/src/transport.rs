//! The abstract QUIC transport seam (spec.md §6.1): the small set of
//! operations `h3lib-core` needs from a QUIC implementation, and nothing
//! more. `h3lib-core` never parses a QUIC packet, never touches
//! congestion control or the TLS handshake — it only ever sees streams
//! that already look like `AsyncRead`/`AsyncWrite`, the same seam the `h3`
//! crate's `quic::Connection` trait draws (see `h3::quic` in the pack) and
//! that `h3lib-quinn` is the sole implementation of.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// A QUIC stream ID, as assigned by the transport. Encodes both
/// unidirectional/bidirectional and client/server-initiated in its low
/// two bits per RFC 9000 §2.1 — `h3lib-core` treats it as opaque beyond
/// ordering (GOAWAY, MAX_PUSH_ID comparisons use plain `u64` ordering).
pub type StreamId = u64;

/// The send half of a QUIC stream. Implementors additionally implement
/// [`AsyncWrite`] — `h3lib-core` writes frames with
/// `tokio::io::AsyncWriteExt::write_all`.
pub trait QuicSendStream: AsyncWrite + Unpin + Send {
    fn id(&self) -> StreamId;

    /// Abruptly terminate the send side with a QUIC RESET_STREAM carrying
    /// `error_code` (an [`crate::error::H3Code`] value) — spec.md §5
    /// "Application may call `Reset(error_code)`".
    fn reset(&mut self, error_code: u64);
}

/// The receive half of a QUIC stream. Implementors additionally implement
/// [`AsyncRead`].
pub trait QuicRecvStream: AsyncRead + Unpin + Send {
    fn id(&self) -> StreamId;

    /// Ask the peer to stop sending on this stream (QUIC STOP_SENDING),
    /// e.g. after deciding a CANCEL_PUSH makes the rest of a push stream
    /// uninteresting.
    fn stop(&mut self, error_code: u64);
}

/// One established QUIC connection. `h3lib-core` is generic over this
/// trait so it never links against a concrete QUIC implementation
/// (spec.md §1 "Out of scope... the QUIC transport itself").
#[async_trait]
pub trait QuicConnection: Send + Sync + 'static {
    type SendStream: QuicSendStream + 'static;
    type RecvStream: QuicRecvStream + 'static;

    /// Open a new unidirectional send stream (control, QPACK encoder,
    /// QPACK decoder, or a server push stream).
    async fn open_uni(&self) -> Result<Self::SendStream>;

    /// Open a new client-initiated bidirectional (request) stream.
    async fn open_bidi(&self) -> Result<(Self::SendStream, Self::RecvStream)>;

    /// Block until the peer opens a new unidirectional stream.
    async fn accept_uni(&self) -> Result<Self::RecvStream>;

    /// Block until the peer opens a new bidirectional stream (server-side
    /// request acceptance).
    async fn accept_bidi(&self) -> Result<(Self::SendStream, Self::RecvStream)>;

    /// Close the whole connection immediately with an application error
    /// code — used when a critical-stream violation demands connection
    /// teardown (spec.md §4.2 "Failure policy").
    fn close(&self, error_code: u64, reason: &[u8]);

    /// Resolve once the connection has closed, for any reason.
    async fn closed(&self);
}

/// Opens outbound connections — the client role's entry point into the
/// transport.
#[async_trait]
pub trait QuicClientEndpoint: Send + Sync {
    type Connection: QuicConnection;

    async fn connect(&self, addr: SocketAddr, server_name: &str) -> Result<Self::Connection>;
}

/// Accepts inbound connections — the server role's entry point into the
/// transport.
#[async_trait]
pub trait QuicServerEndpoint: Send + Sync {
    type Connection: QuicConnection;

    /// Waits for the next inbound connection. `None` means the endpoint
    /// has been shut down and will never produce another.
    async fn accept(&self) -> Option<Result<Self::Connection>>;
}
