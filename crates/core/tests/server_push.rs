//! spec.md §8 scenario: "server responds to `/` with a response carrying
//! a push child for `/style.css`; a client that accepts the promise
//! receives it via its push handler, one that rejects it never does."

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{Method, StatusCode};

use h3lib_core::http::{Body, Fields};
use h3lib_core::{Request, Response};

fn server_with_one_push(mut server: h3lib_core::Server<h3lib_quinn::QuinnServerEndpoint>) -> h3lib_core::Server<h3lib_quinn::QuinnServerEndpoint> {
    server
        .add_handler(Method::GET, "/", |_req, res| {
            res.status = StatusCode::OK;
            res.body = Body::buffered("index");
            res.push("/style.css", Fields::new(), Response::ok().with_body("body{color:red}"));
        })
        .unwrap();
    server
}

#[tokio::test]
async fn accepted_push_is_delivered_to_the_push_handler() {
    common::init_tracing();
    let pair = common::Pair::new();
    let (server, client_endpoint, addr) = pair.server();
    let mut server = server_with_one_push(server);
    server.start().await.unwrap();

    let client = h3lib_core::Client::new(client_endpoint, h3lib_core::H3Config::default());
    client.connect(addr, "localhost").await.unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    client.set_push_promise_handler(|_req| true).unwrap();
    client.set_push_handler(move |resp| received_clone.lock().unwrap().push(resp)).unwrap();

    let request = Request::new(Method::GET, "", "", "");
    let response = client.do_request(Method::GET, "https://localhost/", request).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let pushed = received.lock().unwrap();
    assert_eq!(pushed.len(), 1);
    match &pushed[0].body {
        Body::Buffered(b) => assert_eq!(&b[..], b"body{color:red}"),
        other => panic!("expected buffered push body, got {other:?}"),
    }

    server.stop();
    server.join().await;
}

#[tokio::test]
async fn rejected_push_promise_never_reaches_the_push_handler() {
    common::init_tracing();
    let pair = common::Pair::new();
    let (server, client_endpoint, addr) = pair.server();
    let mut server = server_with_one_push(server);
    server.start().await.unwrap();

    let client = h3lib_core::Client::new(client_endpoint, h3lib_core::H3Config::default());
    client.connect(addr, "localhost").await.unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    client.set_push_promise_handler(|_req| false).unwrap();
    client.set_push_handler(move |resp| received_clone.lock().unwrap().push(resp)).unwrap();

    let request = Request::new(Method::GET, "", "", "");
    let response = client.do_request(Method::GET, "https://localhost/", request).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(received.lock().unwrap().is_empty());

    server.stop();
    server.join().await;
}
