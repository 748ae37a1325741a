//! spec.md §8 scenario: "client issues a 1 MB upload via a body
//! provider callback; server receives it across many DATA frames and
//! echoes its length back."

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};

use h3lib_core::handler::AsyncServerHandler;
use h3lib_core::http::Body;
use h3lib_core::Request;

const UPLOAD_SIZE: usize = 1024 * 1024;

#[tokio::test]
async fn one_megabyte_upload_via_body_provider_round_trips() {
    common::init_tracing();
    let pair = common::Pair::new();
    let (mut server, client_endpoint, addr) = pair.server();

    server
        .add_handler(Method::POST, "/upload", |req, res| {
            let len = match &req.body {
                Body::Buffered(b) => b.len(),
                _ => 0,
            };
            res.status = StatusCode::OK;
            res.body = Body::buffered(len.to_string());
        })
        .unwrap();
    server.start().await.unwrap();

    let client = h3lib_core::Client::new(client_endpoint, h3lib_core::H3Config::default());
    client.connect(addr, "localhost").await.unwrap();

    let mut request = Request::new(Method::POST, "", "", "");
    let mut remaining = UPLOAD_SIZE;
    request.body = Body::from_provider(move |buf| {
        let n = remaining.min(buf.len());
        for slot in buf[..n].iter_mut() {
            *slot = 0xab;
        }
        remaining -= n;
        Ok(n)
    });

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        client.do_request(Method::POST, "https://localhost/upload", request),
    )
    .await
    .expect("request did not time out")
    .expect("request succeeded");

    assert_eq!(response.status, StatusCode::OK);
    match response.body {
        Body::Buffered(b) => assert_eq!(std::str::from_utf8(&b).unwrap(), UPLOAD_SIZE.to_string()),
        other => panic!("expected buffered body, got {other:?}"),
    }

    server.stop();
    server.join().await;
}

struct CountingHandler {
    bytes_seen: Arc<AtomicUsize>,
    chunks_seen: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl AsyncServerHandler for CountingHandler {
    async fn on_headers(&self, _request: &h3lib_core::Request) -> h3lib_core::Response {
        h3lib_core::Response::ok()
    }

    async fn on_body_chunk(&self, data: &[u8], _is_last: bool) {
        self.bytes_seen.fetch_add(data.len(), Ordering::SeqCst);
        self.chunks_seen.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn streaming_mode_handler_sees_every_data_frame() {
    common::init_tracing();
    let pair = common::Pair::new();
    let (mut server, client_endpoint, addr) = pair.server();

    let bytes_seen = Arc::new(AtomicUsize::new(0));
    let chunks_seen = Arc::new(AtomicUsize::new(0));
    server
        .add_handler_streaming(
            Method::POST,
            "/stream",
            CountingHandler { bytes_seen: bytes_seen.clone(), chunks_seen: chunks_seen.clone() },
        )
        .unwrap();
    server.start().await.unwrap();

    let client = h3lib_core::Client::new(client_endpoint, h3lib_core::H3Config::default());
    client.connect(addr, "localhost").await.unwrap();

    let mut request = Request::new(Method::POST, "", "", "");
    request.body = Body::buffered(vec![0x42u8; 200_000]);

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        client.do_request(Method::POST, "https://localhost/stream", request),
    )
    .await
    .expect("request did not time out")
    .expect("request succeeded");

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(bytes_seen.load(Ordering::SeqCst), 200_000);
    assert!(chunks_seen.load(Ordering::SeqCst) >= 1);

    server.stop();
    server.join().await;
}
