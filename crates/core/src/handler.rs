//! Handler variants (spec.md §3 "Route entry", §9 "Handler variants"):
//! modeled as a tagged union rather than a trait-object hierarchy, per the
//! design note — "no virtual hierarchy is required". The router
//! (spec.md §4.3) stores whichever variant was registered and is agnostic
//! to which one it holds; the connection's server role (spec.md §4.2
//! "Receiving behavior") is what inspects the tag to choose buffered vs.
//! streaming delivery.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxedError;
use crate::http::{Request, Response};

/// A buffered-mode server callback: the full request has already been
/// assembled, the handler fills in `response` and returns.
pub type CompleteHandlerFn = Arc<dyn Fn(&mut Request, &mut Response) + Send + Sync>;

/// Streaming-mode server handler (spec.md §4.2 "Async (streaming) mode").
/// `on_headers` fires once, with path/query params already populated;
/// `on_body_chunk` fires once per DATA frame (or once with an empty,
/// `is_last = true` chunk if the request had no body).
#[async_trait]
pub trait AsyncServerHandler: Send + Sync {
    async fn on_headers(&self, request: &Request) -> Response;
    async fn on_body_chunk(&self, data: &[u8], is_last: bool);
}

/// Streaming-mode client handler, the symmetric counterpart used from
/// `Client::do_request_streaming` (spec.md §4.5).
#[async_trait]
pub trait AsyncClientHandler: Send + Sync {
    async fn on_headers(&self, response: &Response);
    async fn on_body_chunk(&self, data: &[u8], is_last: bool);
}

/// What a client callback receives on completion (spec.md §7
/// "User-visible behavior" — "Complete-mode callback receives
/// `(response, error_code)`").
pub type CompleteClientHandlerFn = Box<dyn FnOnce(Result<Response, BoxedError>) + Send>;

/// The value a [`crate::router::Router`] stores per registered route.
/// Cheap to clone: both variants are reference-counted handles.
#[derive(Clone)]
pub enum RouteConfig {
    Complete(CompleteHandlerFn),
    Async(Arc<dyn AsyncServerHandler>),
}

impl RouteConfig {
    pub fn complete(f: impl Fn(&mut Request, &mut Response) + Send + Sync + 'static) -> Self {
        Self::Complete(Arc::new(f))
    }

    pub fn async_handler(handler: impl AsyncServerHandler + 'static) -> Self {
        Self::Async(Arc::new(handler))
    }
}

/// Decides accept/reject for an inbound PUSH_PROMISE (spec.md §4.5
/// "`Client.SetPushPromiseHandler(f)` where `f(headers)→bool`").
pub type PushPromiseHandlerFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Delivers an accepted push's response to the application (spec.md §4.5
/// "`Client.SetPushHandler(f)`").
pub type PushHandlerFn = Arc<dyn Fn(Response) + Send + Sync>;
