//! [`h3lib_core::transport::QuicServerEndpoint`] over a `quinn::Endpoint`
//! bound server-side — the counterpart to [`crate::client::QuinnClientEndpoint`],
//! grounded the same way `salvo_core::conn::quinn::QuinnListener::try_bind`
//! turns a `ServerConfig` + socket address into a running `quinn::Endpoint`
//! before handing off individual connections.

use std::net::SocketAddr;

use async_trait::async_trait;
use h3lib_core::error::{Error, Result};
use h3lib_core::transport::QuicServerEndpoint;
use tracing::warn;

use crate::connection::Connection;

/// A bound UDP socket accepting inbound QUIC connections.
pub struct QuinnServerEndpoint {
    endpoint: quinn::Endpoint,
}

impl QuinnServerEndpoint {
    pub fn bind(server_config: quinn::ServerConfig, addr: SocketAddr) -> std::io::Result<Self> {
        let endpoint = quinn::Endpoint::server(server_config, addr)?;
        Ok(Self { endpoint })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Stop accepting new connections; connections already handed out
    /// keep running until the caller closes them.
    pub fn close(&self, error_code: u64, reason: &[u8]) {
        self.endpoint.close(quinn::VarInt::from_u64(error_code).unwrap_or(quinn::VarInt::MAX), reason);
    }
}

#[async_trait]
impl QuicServerEndpoint for QuinnServerEndpoint {
    type Connection = Connection;

    async fn accept(&self) -> Option<Result<Self::Connection>> {
        let incoming = self.endpoint.accept().await?;
        match incoming.await {
            Ok(conn) => Some(Ok(Connection::new(conn))),
            Err(err) => {
                warn!(%err, "quic handshake failed");
                Some(Err(Error::transport(err)))
            }
        }
    }
}
