//! Shared loopback harness for the integration tests in this directory,
//! grounded in `salvo-quinn`'s own `tests::Pair` helper (build a
//! self-signed cert once, bind a server endpoint on an ephemeral port,
//! connect a client endpoint that trusts exactly that cert).

use std::net::{Ipv6Addr, SocketAddr};

use h3lib_core::{Client, Server, H3Config};
use h3lib_quinn::{tls, QuinnClientEndpoint, QuinnServerEndpoint};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_test_writer().try_init();
}

/// A bound server endpoint plus a client endpoint already configured to
/// trust it, both on loopback.
pub struct Pair {
    pub addr: SocketAddr,
    pub server_endpoint: QuinnServerEndpoint,
    pub client_endpoint: QuinnClientEndpoint,
}

impl Pair {
    pub fn new() -> Self {
        let keycert = tls::Keycert::self_signed(vec!["localhost".into()]).expect("self-signed cert");
        let server_config = tls::server_config(&keycert).expect("server tls config");
        let server_endpoint =
            QuinnServerEndpoint::bind(server_config, SocketAddr::new(Ipv6Addr::LOCALHOST.into(), 0)).expect("bind server");
        let addr = server_endpoint.local_addr().expect("local addr");

        let client_config = tls::client_config(&[keycert]).expect("client tls config");
        let client_endpoint = QuinnClientEndpoint::bind(client_config).expect("bind client");

        Self { addr, server_endpoint, client_endpoint }
    }

    /// Build a [`Server`] bound to this pair's server endpoint; the
    /// caller still has to register handlers and call `start`.
    pub fn server(self) -> (Server<QuinnServerEndpoint>, QuinnClientEndpoint, SocketAddr) {
        (Server::new(self.server_endpoint, H3Config::default()), self.client_endpoint, self.addr)
    }
}
