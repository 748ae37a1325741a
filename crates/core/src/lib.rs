//! `h3lib-core`: a transport-agnostic HTTP/3 (RFC 9114) engine with QPACK
//! (RFC 9204) header compression, embeddable as a [`Client`] or [`Server`]
//! over any QUIC implementation that satisfies [`transport::QuicConnection`].
//!
//! This crate never opens a socket and never touches TLS — see
//! `h3lib-quinn` for the one production binding, built on `quinn` +
//! `rustls`.

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod http;
mod huffman;
pub mod pseudo_header;
pub mod qpack;
pub mod router;
pub mod stream;
pub mod transport;
mod varint;

pub use client::Client;
pub use config::H3Config;
pub use error::{Error, H3Code, H3Error, Result};
pub use handler::{AsyncClientHandler, AsyncServerHandler, RouteConfig};
pub use http::{Request, Response};
pub use server::Server;

mod client;
mod server;
