//! `h3lib-quinn`: the `quinn` + `rustls` binding of
//! [`h3lib_core::transport::QuicConnection`] and friends — the one
//! production QUIC transport `h3lib-core` is built against (spec.md §1
//! "Out of scope: the QUIC transport itself... The core *consumes* the
//! QUIC transport through a small abstract interface").
//!
//! This crate owns everything `h3lib-core` explicitly does not: binding
//! UDP sockets, running the QUIC handshake, and building `rustls`
//! credentials. Typical use:
//!
//! ```no_run
//! # async fn example() -> h3lib_core::error::Result<()> {
//! use h3lib_quinn::{tls, QuinnClientEndpoint, QuinnServerEndpoint};
//!
//! let keycert = tls::Keycert::self_signed(vec!["localhost".into()]).unwrap();
//! let server_endpoint = QuinnServerEndpoint::bind(
//!     tls::server_config(&keycert).unwrap(),
//!     "127.0.0.1:8883".parse().unwrap(),
//! ).unwrap();
//! let mut server = h3lib_core::Server::new(server_endpoint, h3lib_core::H3Config::default());
//!
//! let client_endpoint = QuinnClientEndpoint::bind(tls::client_config(&[keycert]).unwrap()).unwrap();
//! let client = h3lib_core::Client::new(client_endpoint, h3lib_core::H3Config::default());
//! client.connect("127.0.0.1:8883".parse().unwrap(), "localhost").await?;
//! # Ok(())
//! # }
//! ```

pub mod tls;

mod client;
mod connection;
mod server;
mod stream;

pub use client::QuinnClientEndpoint;
pub use connection::Connection;
pub use server::QuinnServerEndpoint;
pub use stream::{RecvStream, SendStream};
