//! Exercises `QuinnClientEndpoint`/`QuinnServerEndpoint`/`Connection`
//! against each other directly, independent of `h3lib-core`'s HTTP/3
//! layer above them — a real QUIC handshake plus one bidi stream
//! round-trip on loopback.

use std::net::{Ipv6Addr, SocketAddr};

use h3lib_core::transport::{QuicClientEndpoint, QuicConnection, QuicServerEndpoint};
use h3lib_quinn::{tls, QuinnClientEndpoint, QuinnServerEndpoint};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn client_and_server_complete_the_quic_handshake_and_exchange_a_bidi_stream() {
    let keycert = tls::Keycert::self_signed(vec!["localhost".into()]).unwrap();
    let server_config = tls::server_config(&keycert).unwrap();
    let server_endpoint = QuinnServerEndpoint::bind(server_config, SocketAddr::new(Ipv6Addr::LOCALHOST.into(), 0)).unwrap();
    let addr = server_endpoint.local_addr().unwrap();

    let client_config = tls::client_config(&[keycert]).unwrap();
    let client_endpoint = QuinnClientEndpoint::bind(client_config).unwrap();

    let server_task = tokio::spawn(async move {
        let conn = server_endpoint.accept().await.unwrap().unwrap();
        let (mut send, mut recv) = conn.accept_bidi().await.unwrap();
        let mut buf = [0u8; 5];
        recv.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        send.write_all(b"world").await.unwrap();
        send.shutdown().await.unwrap();
    });

    let conn = client_endpoint.connect(addr, "localhost").await.unwrap();
    let (mut send, mut recv) = conn.open_bidi().await.unwrap();
    send.write_all(b"hello").await.unwrap();
    send.shutdown().await.unwrap();
    let mut buf = [0u8; 5];
    recv.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"world");

    server_task.await.unwrap();
}

#[tokio::test]
async fn insecure_client_config_connects_to_a_self_signed_server() {
    let keycert = tls::Keycert::self_signed(vec!["localhost".into()]).unwrap();
    let server_config = tls::server_config(&keycert).unwrap();
    let server_endpoint = QuinnServerEndpoint::bind(server_config, SocketAddr::new(Ipv6Addr::LOCALHOST.into(), 0)).unwrap();
    let addr = server_endpoint.local_addr().unwrap();

    let client_endpoint = QuinnClientEndpoint::bind(tls::insecure_client_config()).unwrap();

    let server_task = tokio::spawn(async move {
        server_endpoint.accept().await.unwrap().unwrap();
    });

    client_endpoint.connect(addr, "localhost").await.unwrap();
    server_task.await.unwrap();
}
