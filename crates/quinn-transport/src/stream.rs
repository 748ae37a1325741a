//! Newtype wrappers around `quinn::SendStream`/`quinn::RecvStream` that
//! satisfy [`h3lib_core::transport::QuicSendStream`] /
//! [`QuicRecvStream`](h3lib_core::transport::QuicRecvStream). Both quinn
//! stream types already implement `AsyncWrite`/`AsyncRead` and are
//! `Unpin`, so the wrappers only need to forward the poll methods and add
//! the handful of operations `h3lib-core` actually calls (`id`, `reset`,
//! `stop`) — the same "stream, but render our own error codes" shape
//! `webtransport-quinn`'s `SendStream`/`RecvStream` use over the same
//! underlying quinn types.

use std::pin::Pin;
use std::task::{Context, Poll};

use h3lib_core::transport::{QuicRecvStream, QuicSendStream, StreamId};
use tokio::io::{self, AsyncRead, AsyncWrite, ReadBuf};

pub struct SendStream(pub(crate) quinn::SendStream);

impl QuicSendStream for SendStream {
    fn id(&self) -> StreamId {
        self.0.id().0
    }

    fn reset(&mut self, error_code: u64) {
        // Already-finished/reset streams return an error we don't care
        // about — the caller just wants the stream gone.
        let _ = self.0.reset(quinn::VarInt::from_u64(error_code).unwrap_or(quinn::VarInt::MAX));
    }
}

impl AsyncWrite for SendStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

pub struct RecvStream(pub(crate) quinn::RecvStream);

impl QuicRecvStream for RecvStream {
    fn id(&self) -> StreamId {
        self.0.id().0
    }

    fn stop(&mut self, error_code: u64) {
        let _ = self.0.stop(quinn::VarInt::from_u64(error_code).unwrap_or(quinn::VarInt::MAX));
    }
}

impl AsyncRead for RecvStream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}
