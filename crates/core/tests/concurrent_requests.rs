//! spec.md §8 scenario 4: "Client opens one connection; concurrently
//! issues N requests" — all multiplex correctly over the one QUIC
//! connection and each response matches its own request.

mod common;

use std::time::Duration;

use http::{Method, StatusCode};

use h3lib_core::http::Body;
use h3lib_core::Request;

#[tokio::test]
async fn fifteen_concurrent_requests_multiplex_over_one_connection() {
    common::init_tracing();
    let pair = common::Pair::new();
    let (mut server, client_endpoint, addr) = pair.server();

    server
        .add_handler(Method::GET, "/echo/:n", |req, res| {
            let n = req.path_param("n").unwrap_or_default().to_owned();
            res.status = StatusCode::OK;
            res.body = Body::buffered(n);
        })
        .unwrap();
    server.start().await.unwrap();

    let client = std::sync::Arc::new(h3lib_core::Client::new(client_endpoint, h3lib_core::H3Config::default()));
    client.connect(addr, "localhost").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..15 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let request = Request::new(Method::GET, "", "", "");
            let url = format!("https://localhost/echo/{i}");
            let response = tokio::time::timeout(Duration::from_secs(5), client.do_request(Method::GET, &url, request))
                .await
                .expect("request did not time out")
                .expect("request succeeded");
            (i, response)
        }));
    }

    for task in tasks {
        let (i, response) = task.await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        match response.body {
            Body::Buffered(b) => assert_eq!(std::str::from_utf8(&b).unwrap(), i.to_string()),
            other => panic!("expected buffered body, got {other:?}"),
        }
    }

    server.stop();
    server.join().await;
}
