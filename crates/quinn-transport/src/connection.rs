//! [`h3lib_core::transport::QuicConnection`] over a live `quinn::Connection`
//! — the one production implementation of the seam `h3lib-core` consumes
//! (spec.md §6.1). Mirrors `webtransport-quinn`'s `Session`: a thin
//! `#[derive(Clone)]` wrapper whose methods forward straight to the quinn
//! connection, translating its error type into [`h3lib_core::error::Error`].

use async_trait::async_trait;
use h3lib_core::error::{Error, Result};
use h3lib_core::transport::QuicConnection;

use crate::stream::{RecvStream, SendStream};

#[derive(Clone)]
pub struct Connection(quinn::Connection);

impl Connection {
    pub(crate) fn new(inner: quinn::Connection) -> Self {
        Self(inner)
    }

    pub fn remote_address(&self) -> std::net::SocketAddr {
        self.0.remote_address()
    }
}

#[async_trait]
impl QuicConnection for Connection {
    type SendStream = SendStream;
    type RecvStream = RecvStream;

    async fn open_uni(&self) -> Result<Self::SendStream> {
        self.0.open_uni().await.map(SendStream).map_err(Error::transport)
    }

    async fn open_bidi(&self) -> Result<(Self::SendStream, Self::RecvStream)> {
        let (send, recv) = self.0.open_bi().await.map_err(Error::transport)?;
        Ok((SendStream(send), RecvStream(recv)))
    }

    async fn accept_uni(&self) -> Result<Self::RecvStream> {
        self.0.accept_uni().await.map(RecvStream).map_err(Error::transport)
    }

    async fn accept_bidi(&self) -> Result<(Self::SendStream, Self::RecvStream)> {
        let (send, recv) = self.0.accept_bi().await.map_err(Error::transport)?;
        Ok((SendStream(send), RecvStream(recv)))
    }

    fn close(&self, error_code: u64, reason: &[u8]) {
        self.0.close(quinn::VarInt::from_u64(error_code).unwrap_or(quinn::VarInt::MAX), reason);
    }

    async fn closed(&self) {
        self.0.closed().await;
    }
}
