//! `IClient` (spec.md §4.5, §6.4): the application-facing HTTP/3 client.
//! Grounded in the same shape the teacher's own connectors expose
//! (`salvo_core::conn::quinn::client::QuinnConnector` — construct once,
//! `connect`, then issue calls against the live connection) generalized
//! from "open a QUIC connection" to "open an HTTP/3 connection over one".
//!
//! One [`Client`] owns at most one underlying connection at a time — the
//! common case for an HTTP/3 client talking to a single origin (spec.md §8
//! scenario 4: "Client opens one connection; concurrently issues 15
//! requests"). Call [`Client::connect`] once, then issue any number of
//! [`Client::do_request`] / [`Client::do_request_streaming`] calls
//! concurrently; they all multiplex over the same QUIC connection.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use parking_lot::Mutex;

use crate::config::H3Config;
use crate::connection::client::ClientConnection;
use crate::error::{Error, Result};
use crate::handler::{AsyncClientHandler, PushHandlerFn, PushPromiseHandlerFn};
use crate::http::Request;
use crate::transport::QuicClientEndpoint;

/// An embeddable HTTP/3 client (spec.md §4.5 "`IClient`"), generic over the
/// QUIC client endpoint that actually opens sockets (spec.md §6.1) — in
/// practice `h3lib_quinn::QuinnClientEndpoint`.
pub struct Client<E: QuicClientEndpoint> {
    endpoint: E,
    config: H3Config,
    connection: Mutex<Option<ClientConnection>>,
    push_promise_handler: Mutex<Option<PushPromiseHandlerFn>>,
    push_handler: Mutex<Option<PushHandlerFn>>,
}

impl<E: QuicClientEndpoint> Client<E> {
    /// `Client(settings).Init(config)` (spec.md §6.4), collapsed into one
    /// constructor since Rust has no separate "not yet initialized" state
    /// worth modeling.
    pub fn new(endpoint: E, config: H3Config) -> Self {
        Self {
            endpoint,
            config,
            connection: Mutex::new(None),
            push_promise_handler: Mutex::new(None),
            push_handler: Mutex::new(None),
        }
    }

    /// Open the QUIC connection this client will issue requests over, and
    /// drive it through the HTTP/3 client handshake (SETTINGS + MAX_PUSH_ID,
    /// spec.md §4.4 "Client role"). Any push handlers already installed via
    /// [`Self::set_push_promise_handler`] / [`Self::set_push_handler`] carry
    /// over onto the new connection.
    pub async fn connect(&self, addr: SocketAddr, server_name: &str) -> Result<()> {
        let quic = self.endpoint.connect(addr, server_name).await?;
        let conn = ClientConnection::establish(quic, self.config.clone()).await?;
        if let Some(f) = self.push_promise_handler.lock().clone() {
            conn.set_push_promise_handler(f)?;
        }
        if let Some(f) = self.push_handler.lock().clone() {
            conn.set_push_handler(f)?;
        }
        *self.connection.lock() = Some(conn);
        Ok(())
    }

    fn active(&self) -> Result<ClientConnection> {
        self.connection.lock().clone().ok_or_else(|| Error::other("client is not connected; call Client::connect first"))
    }

    /// Buffered-mode request (spec.md §6.4
    /// "`Client.DoRequest(url, method, request, complete_handler)`",
    /// expressed as an `async fn` returning the response rather than
    /// taking a callback — the callback shape survives as
    /// [`crate::handler::CompleteClientHandlerFn`] for callers that want to
    /// adapt one).
    pub async fn do_request(&self, method: Method, url: &str, request: Request) -> Result<crate::http::Response> {
        let request = fill_request_from_url(method, url, request)?;
        self.active()?.do_request(request).await
    }

    /// Streaming-mode request (spec.md §6.4 "... `async_handler`"):
    /// `handler.on_headers` fires once, `handler.on_body_chunk` once per
    /// DATA frame, and the returned future resolves on FIN.
    pub async fn do_request_streaming(
        &self,
        method: Method,
        url: &str,
        request: Request,
        handler: Arc<dyn AsyncClientHandler>,
    ) -> Result<()> {
        let request = fill_request_from_url(method, url, request)?;
        self.active()?.do_request_streaming(request, handler).await
    }

    /// `Client.SetPushPromiseHandler(f)` (spec.md §6.4): `f(headers)→bool`
    /// decides whether an inbound PUSH_PROMISE is accepted.
    pub fn set_push_promise_handler(&self, f: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Result<()> {
        let f: PushPromiseHandlerFn = Arc::new(f);
        *self.push_promise_handler.lock() = Some(f.clone());
        if let Some(conn) = self.connection.lock().clone() {
            conn.set_push_promise_handler(f)?;
        }
        Ok(())
    }

    /// `Client.SetPushHandler(f)` (spec.md §6.4): delivers an accepted
    /// push's assembled response to the application.
    pub fn set_push_handler(&self, f: impl Fn(crate::http::Response) + Send + Sync + 'static) -> Result<()> {
        let f: PushHandlerFn = Arc::new(f);
        *self.push_handler.lock() = Some(f.clone());
        if let Some(conn) = self.connection.lock().clone() {
            conn.set_push_handler(f)?;
        }
        Ok(())
    }

    /// `Client.SetMaxPushID(n)` (spec.md §6.4): raise the Push ID this
    /// client advertises to the server. Must only ever increase.
    pub async fn set_max_push_id(&self, push_id: u64) -> Result<()> {
        self.active()?.set_max_push_id(push_id).await
    }

    /// Send GOAWAY and close the active connection.
    pub fn shutdown(&self) -> Result<()> {
        self.active()?.shutdown()
    }
}

/// Parse `url` with `http::Uri` (round-trips per spec.md §8 "URL parse ∘
/// URL serialize = identity") and populate the request's pseudo-headers
/// from it, leaving any path/query parameters already set on `request`
/// untouched.
fn fill_request_from_url(method: Method, url: &str, mut request: Request) -> Result<Request> {
    let uri: http::Uri = url.parse().map_err(|e| Error::other(format!("invalid url {url:?}: {e}")))?;
    request.method = method;
    request.scheme = Bytes::from(uri.scheme_str().unwrap_or("https").to_owned());
    let authority = uri.authority().ok_or_else(|| Error::other(format!("url missing authority: {url:?}")))?;
    request.authority = Bytes::from(authority.as_str().to_owned());
    let path = uri.path_and_query().map(|pq| pq.as_str().to_owned()).unwrap_or_else(|| "/".to_owned());
    request.path = Bytes::from(path);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;

    #[test]
    fn fill_request_from_url_splits_scheme_authority_path() {
        let request = Request::new(Method::GET, "", "", "");
        let request = fill_request_from_url(Method::GET, "https://example.com:8883/users/1?x=1", request).unwrap();
        assert_eq!(request.scheme, Bytes::from_static(b"https"));
        assert_eq!(request.authority, Bytes::from_static(b"example.com:8883"));
        assert_eq!(request.path, Bytes::from_static(b"/users/1?x=1"));
    }

    #[test]
    fn fill_request_from_url_rejects_missing_authority() {
        let request = Request::new(Method::GET, "", "", "");
        assert!(fill_request_from_url(Method::GET, "/relative/path", request).is_err());
    }
}
