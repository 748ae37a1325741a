//! The response object (spec.md §3 "Request / Response", §4.5 "Public
//! surface" — `IResponse`/`Response`), plus the server-push child list a
//! handler appends to (spec.md §4.2 "Server-push send stream").

use bytes::Bytes;
use http::StatusCode;

use super::body::Body;
use super::fields::Fields;

#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Fields,
    pub body: Body,
    /// Trailing HEADERS sent after the body, or received after it (RFC
    /// 9114 §4.3; spec.md §9). Emitted only when non-empty.
    pub trailers: Fields,
    pub pushes: Vec<PushChild>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: Fields::new(), body: Body::Empty, trailers: Fields::new(), pushes: Vec::new() }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Buffered(body.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_trailer(mut self, name: &str, value: &str) -> Self {
        self.trailers.insert(name, value);
        self
    }

    /// Register a server push (spec.md §4.4 "Server push: when the
    /// handler's response has a non-empty push-child list..."). `path` and
    /// `request_headers` describe the synthetic request the pushed
    /// response answers.
    pub fn push(&mut self, path: impl Into<Bytes>, request_headers: Fields, response: Response) {
        self.pushes.push(PushChild { path: path.into(), request_headers, response });
    }
}

/// One server-push child: the synthetic request it answers (for the
/// PUSH_PROMISE header block) plus the response to actually send.
#[derive(Debug)]
pub struct PushChild {
    pub path: Bytes,
    pub request_headers: Fields,
    pub response: Response,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_children_accumulate_in_order() {
        let mut response = Response::ok();
        response.push("/style.css", Fields::new(), Response::ok().with_body("body {}"));
        response.push("/script.js", Fields::new(), Response::ok().with_body("console.log(1)"));
        assert_eq!(response.pushes.len(), 2);
        assert_eq!(response.pushes[0].path, Bytes::from_static(b"/style.css"));
    }
}
