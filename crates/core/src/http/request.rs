//! The request object (spec.md §3 "Request / Response", §4.5 "Public
//! surface" — `IRequest`/`Request`).

use bytes::Bytes;
use http::Method;
use indexmap::IndexMap;

use super::body::Body;
use super::fields::Fields;

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub scheme: Bytes,
    pub authority: Bytes,
    pub path: Bytes,
    pub headers: Fields,
    pub body: Body,
    /// Trailing HEADERS received after the body (RFC 9114 §4.3), if any
    /// (spec.md §9 — "should support receive and emit"). Empty unless the
    /// peer actually sent trailers.
    pub trailers: Fields,
    /// Captured `:name` segments, populated by the router on a match.
    pub path_params: IndexMap<String, String>,
    /// Parsed `?a=b&c=d` query string.
    pub query_params: IndexMap<String, String>,
}

impl Request {
    pub fn new(method: Method, scheme: impl Into<Bytes>, authority: impl Into<Bytes>, path: impl Into<Bytes>) -> Self {
        Self {
            method,
            scheme: scheme.into(),
            authority: authority.into(),
            path: path.into(),
            headers: Fields::new(),
            body: Body::Empty,
            trailers: Fields::new(),
            path_params: IndexMap::new(),
            query_params: IndexMap::new(),
        }
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// The path without its query component, for route matching.
    pub fn path_without_query(&self) -> &[u8] {
        match self.path.iter().position(|&b| b == b'?') {
            Some(idx) => &self.path[..idx],
            None => &self.path,
        }
    }
}

/// Parse a `a=b&c=d` query string (spec.md §3 "query-parameter maps").
pub fn parse_query(path: &[u8]) -> IndexMap<String, String> {
    let mut params = IndexMap::new();
    let Some(q_idx) = path.iter().position(|&b| b == b'?') else { return params };
    let query = &path[q_idx + 1..];
    for pair in query.split(|&b| b == b'&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.iter().position(|&b| b == b'=') {
            Some(eq) => (&pair[..eq], &pair[eq + 1..]),
            None => (pair, &pair[pair.len()..]),
        };
        params.insert(String::from_utf8_lossy(key).into_owned(), String::from_utf8_lossy(value).into_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_is_parsed_into_ordered_map() {
        let params = parse_query(b"/search?q=rust&lang=en");
        assert_eq!(params.get("q").map(String::as_str), Some("rust"));
        assert_eq!(params.get("lang").map(String::as_str), Some("en"));
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["q", "lang"]);
    }

    #[test]
    fn path_without_query_strips_suffix() {
        let req = Request::new(Method::GET, "https", "example.com", "/users/1?x=1");
        assert_eq!(req.path_without_query(), b"/users/1");
    }

    #[test]
    fn flag_without_value_maps_to_empty_string() {
        let params = parse_query(b"/x?flag");
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
    }
}
