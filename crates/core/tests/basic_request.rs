//! spec.md §8 scenario: "GET /users/:id — router captures `id` as a path
//! parameter; handler reads it off the request and echoes it back."

mod common;

use std::time::Duration;

use http::{Method, StatusCode};

use h3lib_core::Request;

#[tokio::test]
async fn get_with_path_param_round_trips_through_the_router() {
    common::init_tracing();
    let pair = common::Pair::new();
    let (mut server, client_endpoint, addr) = pair.server();

    server
        .add_handler(Method::GET, "/users/:id", |req, res| {
            let id = req.path_param("id").unwrap_or_default().to_owned();
            res.status = StatusCode::OK;
            res.body = h3lib_core::http::Body::buffered(format!("user:{id}"));
        })
        .unwrap();
    server.start().await.unwrap();

    let client = h3lib_core::Client::new(client_endpoint, h3lib_core::H3Config::default());
    client.connect(addr, "localhost").await.unwrap();

    let request = Request::new(Method::GET, "", "", "");
    let response = tokio::time::timeout(Duration::from_secs(5), client.do_request(Method::GET, "https://localhost/users/42", request))
        .await
        .expect("request did not time out")
        .expect("request succeeded");

    assert_eq!(response.status, StatusCode::OK);
    match response.body {
        h3lib_core::http::Body::Buffered(b) => assert_eq!(&b[..], b"user:42"),
        other => panic!("expected buffered body, got {other:?}"),
    }

    server.stop();
    server.join().await;
}

#[tokio::test]
async fn unmatched_route_gets_a_404() {
    common::init_tracing();
    let pair = common::Pair::new();
    let (mut server, client_endpoint, addr) = pair.server();

    server.add_handler(Method::GET, "/users/:id", |_req, _res| {}).unwrap();
    server.start().await.unwrap();

    let client = h3lib_core::Client::new(client_endpoint, h3lib_core::H3Config::default());
    client.connect(addr, "localhost").await.unwrap();

    let request = Request::new(Method::GET, "", "", "");
    let response = client.do_request(Method::GET, "https://localhost/orders/1", request).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    server.stop();
    server.join().await;
}
