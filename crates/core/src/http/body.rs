//! Request/response bodies (spec.md §3 "Request / Response", §4.2 "Sending
//! behavior"): either a fully buffered byte sequence, or a provider
//! callback that the stream machinery drains in chunks as it emits DATA
//! frames.

use bytes::Bytes;

use crate::error::BoxedError;

/// Repeatedly invoked with a writable span; returns bytes written. A
/// return of `Ok(0)` signals end-of-body. An `Err` aborts the stream with
/// `H3_INTERNAL_ERROR` (spec.md §4.2 "Providers must be allowed to...
/// return error").
pub type BodyProviderFn = Box<dyn FnMut(&mut [u8]) -> Result<usize, BoxedError> + Send>;

pub enum Body {
    Empty,
    Buffered(Bytes),
    Provider(BodyProviderFn),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty) || matches!(self, Self::Buffered(b) if b.is_empty())
    }

    pub fn buffered(data: impl Into<Bytes>) -> Self {
        Self::Buffered(data.into())
    }

    pub fn from_provider(f: impl FnMut(&mut [u8]) -> Result<usize, BoxedError> + Send + 'static) -> Self {
        Self::Provider(Box::new(f))
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Body::Empty"),
            Self::Buffered(b) => write!(f, "Body::Buffered({} bytes)", b.len()),
            Self::Provider(_) => write!(f, "Body::Provider(..)"),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_variants_report_empty() {
        assert!(Body::Empty.is_empty());
        assert!(Body::buffered(Bytes::new()).is_empty());
        assert!(!Body::buffered(Bytes::from_static(b"x")).is_empty());
    }

    #[test]
    fn provider_drains_to_zero_at_eof() {
        let mut remaining = vec![1u8, 2, 3];
        let mut body = Body::from_provider(move |buf| {
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            remaining.drain(..n);
            Ok(n)
        });
        let Body::Provider(ref mut provider) = body else { unreachable!() };
        let mut buf = [0u8; 2];
        assert_eq!(provider(&mut buf).unwrap(), 2);
        assert_eq!(provider(&mut buf).unwrap(), 1);
        assert_eq!(provider(&mut buf).unwrap(), 0);
    }
}
