//! [`h3lib_core::transport::QuicClientEndpoint`] over a `quinn::Endpoint`
//! bound client-side, grounded in `hdds`'s `QuicTransportHandle::connect`
//! (resolve the socket addr, `endpoint.connect(...).await`, wrap the
//! result) generalized from a single fixed remote into "whatever address
//! the caller passes".

use std::net::{Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use h3lib_core::error::{Error, Result};
use h3lib_core::transport::QuicClientEndpoint;

use crate::connection::Connection;

/// A bound UDP socket ready to dial outbound QUIC connections.
pub struct QuinnClientEndpoint {
    endpoint: quinn::Endpoint,
}

impl QuinnClientEndpoint {
    /// Bind an ephemeral UDP socket and configure it with `client_config`
    /// (see [`crate::tls::client_config`] / [`crate::tls::insecure_client_config`]).
    pub fn bind(client_config: quinn::ClientConfig) -> std::io::Result<Self> {
        let mut endpoint = quinn::Endpoint::client(SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0))?;
        endpoint.set_default_client_config(client_config);
        Ok(Self { endpoint })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }
}

#[async_trait]
impl QuicClientEndpoint for QuinnClientEndpoint {
    type Connection = Connection;

    async fn connect(&self, addr: SocketAddr, server_name: &str) -> Result<Self::Connection> {
        let connecting = self.endpoint.connect(addr, server_name).map_err(Error::transport)?;
        let conn = connecting.await.map_err(Error::transport)?;
        Ok(Connection::new(conn))
    }
}
