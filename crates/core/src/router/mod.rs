//! Path routing (spec.md §4.3): per-method tries over `/`-separated
//! patterns of static segments, `:name` captures and a trailing `*`
//! wildcard, matched static > parameter > wildcard with longest-static-match
//! winning ties.
//!
//! Grounded in the priority rules `salvo_core::routing::filter::PathFilter`
//! encodes via its ordered list of `PathPart`s, simplified to the fixed
//! three-part grammar spec.md §4.3 defines (no regex, no char-class parts).

mod trie;

use http::Method;
use indexmap::IndexMap;
use thiserror::Error;

use trie::Node;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("wildcard '*' is only valid as the final path segment: {0}")]
    WildcardNotFinal(String),
    #[error("empty path segment in pattern: {0}")]
    EmptySegment(String),
}

/// One `/`-separated piece of a registered pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard,
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, RouterError> {
    let trimmed = pattern.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&str> = trimmed.split('/').collect();
    let mut segments = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            return Err(RouterError::EmptySegment(pattern.to_owned()));
        }
        if *part == "*" {
            if i != parts.len() - 1 {
                return Err(RouterError::WildcardNotFinal(pattern.to_owned()));
            }
            segments.push(Segment::Wildcard);
        } else if let Some(name) = part.strip_prefix(':') {
            segments.push(Segment::Param(name.to_owned()));
        } else {
            segments.push(Segment::Static((*part).to_owned()));
        }
    }
    Ok(segments)
}

/// Path parameters captured by a successful match.
pub type PathParams = IndexMap<String, String>;

/// A per-method collection of registered patterns with their associated
/// route values. The router is agnostic to what `T` is — spec.md §4.3
/// "the router does not know the difference between [handler] modes".
pub struct Router<T> {
    by_method: IndexMap<Method, Node<T>>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self { by_method: IndexMap::new() }
    }
}

impl<T> Router<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` for `method` at `pattern`. Patterns may repeat a
    /// `:name`/`*` shape across methods; this is not checked for ambiguity
    /// beyond what `insert` naturally resolves by longest-static-match at
    /// matching time.
    pub fn register(&mut self, method: Method, pattern: &str, value: T) -> Result<(), RouterError> {
        let segments = parse_pattern(pattern)?;
        self.by_method.entry(method).or_insert_with(Node::new).insert(&segments, value);
        Ok(())
    }

    /// Match `path` (no query string) against `method`'s trie. Returns the
    /// matched value and the captured path parameters, or `None` for a
    /// spec.md "404" (no match) — callers synthesize the not-found
    /// response themselves.
    pub fn matched(&self, method: &Method, path: &[u8]) -> Option<(&T, PathParams)> {
        let node = self.by_method.get(method)?;
        let path = std::str::from_utf8(path).ok()?;
        let trimmed = path.trim_start_matches('/');
        let parts: Vec<&str> = if trimmed.is_empty() { Vec::new() } else { trimmed.split('/').collect() };
        let mut params = PathParams::new();
        let value = node.matched(&parts, &mut params)?;
        Some((value, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_beats_param_and_param_beats_wildcard() {
        let mut router: Router<&'static str> = Router::new();
        router.register(Method::GET, "/users/:id", "param").unwrap();
        router.register(Method::GET, "/users/me", "static").unwrap();
        router.register(Method::GET, "/users/*", "wildcard").unwrap();

        let (value, params) = router.matched(&Method::GET, b"/users/me").unwrap();
        assert_eq!(*value, "static");
        assert!(params.is_empty());

        let (value, params) = router.matched(&Method::GET, b"/users/1").unwrap();
        assert_eq!(*value, "param");
        assert_eq!(params.get("id").map(String::as_str), Some("1"));

        let (value, params) = router.matched(&Method::GET, b"/users/1/2/3").unwrap();
        assert_eq!(*value, "wildcard");
        assert_eq!(params.get("*").map(String::as_str), Some("1/2/3"));
    }

    #[test]
    fn longest_static_match_wins_over_shallower_param() {
        let mut router: Router<&'static str> = Router::new();
        router.register(Method::GET, "/a/:x", "shallow-param").unwrap();
        router.register(Method::GET, "/a/b/c", "deep-static").unwrap();
        let (value, _) = router.matched(&Method::GET, b"/a/b/c").unwrap();
        assert_eq!(*value, "deep-static");
    }

    #[test]
    fn no_match_is_none_not_error() {
        let mut router: Router<&'static str> = Router::new();
        router.register(Method::GET, "/users/:id", "x").unwrap();
        assert!(router.matched(&Method::GET, b"/orders/1").is_none());
        assert!(router.matched(&Method::POST, b"/users/1").is_none());
    }

    #[test]
    fn wildcard_must_be_final_segment() {
        let mut router: Router<&'static str> = Router::new();
        assert_eq!(
            router.register(Method::GET, "/a/*/b", "x"),
            Err(RouterError::WildcardNotFinal("/a/*/b".to_owned()))
        );
    }

    #[test]
    fn root_pattern_matches_empty_path() {
        let mut router: Router<&'static str> = Router::new();
        router.register(Method::GET, "/", "root").unwrap();
        let (value, _) = router.matched(&Method::GET, b"/").unwrap();
        assert_eq!(*value, "root");
    }
}
