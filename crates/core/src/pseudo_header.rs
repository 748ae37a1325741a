//! Pseudo-header encode/decode (spec.md §2 "Pseudo-header codec", RFC 9114
//! §4.3): translates `:method`/`:scheme`/`:authority`/`:path`/`:status`
//! to/from the flat list of [`crate::qpack::HeaderField`]s a QPACK block
//! carries, and the typed [`crate::http::Method`]/[`http::StatusCode`] the
//! rest of the crate works with.

use bytes::Bytes;
use http::{Method, StatusCode};

use crate::error::{Error, Result};
use crate::qpack::HeaderField;

/// A request's pseudo-headers, decoded out of the leading run of a header
/// block (RFC 9114 §4.3.1).
#[derive(Debug, Clone)]
pub struct RequestPseudoHeaders {
    pub method: Method,
    pub scheme: Bytes,
    pub authority: Bytes,
    pub path: Bytes,
}

/// A response's pseudo-headers (RFC 9114 §4.3.2): just `:status`.
#[derive(Debug, Clone, Copy)]
pub struct ResponsePseudoHeaders {
    pub status: StatusCode,
}

fn is_pseudo(name: &[u8]) -> bool {
    name.first() == Some(&b':')
}

impl RequestPseudoHeaders {
    /// Build the leading pseudo-header fields for a request header block,
    /// in the RFC-mandated order.
    pub fn encode(&self) -> Vec<HeaderField> {
        vec![
            HeaderField::new(Bytes::from_static(b":method"), Bytes::from(self.method.as_str().to_owned())),
            HeaderField::new(Bytes::from_static(b":scheme"), self.scheme.clone()),
            HeaderField::new(Bytes::from_static(b":authority"), self.authority.clone()),
            HeaderField::new(Bytes::from_static(b":path"), self.path.clone()),
        ]
    }

    /// Split `fields` into pseudo-headers and the remaining regular fields,
    /// validating that every pseudo-header precedes all regular ones
    /// (spec.md §3 "Header field" invariant) and that exactly the expected
    /// set for a request is present.
    pub fn decode(fields: &[HeaderField]) -> Result<(Self, Vec<HeaderField>)> {
        let (pseudo, regular) = split_pseudo(fields)?;

        let mut method = None;
        let mut scheme = None;
        let mut authority = None;
        let mut path = None;
        for field in &pseudo {
            match field.name.as_ref() {
                b":method" => {
                    let s = std::str::from_utf8(&field.value)
                        .map_err(|_| Error::other("invalid :method"))?;
                    method = Some(s.parse::<Method>().map_err(|_| Error::other("invalid :method"))?);
                }
                b":scheme" => scheme = Some(field.value.clone()),
                b":authority" => authority = Some(field.value.clone()),
                b":path" => path = Some(field.value.clone()),
                other => {
                    return Err(Error::other(format!(
                        "unexpected pseudo-header in request: {}",
                        String::from_utf8_lossy(other)
                    )))
                }
            }
        }

        Ok((
            Self {
                method: method.ok_or_else(|| Error::other("missing :method"))?,
                scheme: scheme.ok_or_else(|| Error::other("missing :scheme"))?,
                authority: authority.ok_or_else(|| Error::other("missing :authority"))?,
                path: path.ok_or_else(|| Error::other("missing :path"))?,
            },
            regular,
        ))
    }
}

impl ResponsePseudoHeaders {
    pub fn encode(&self) -> Vec<HeaderField> {
        vec![HeaderField::new(
            Bytes::from_static(b":status"),
            Bytes::from(self.status.as_str().to_owned()),
        )]
    }

    pub fn decode(fields: &[HeaderField]) -> Result<(Self, Vec<HeaderField>)> {
        let (pseudo, regular) = split_pseudo(fields)?;
        let mut status = None;
        for field in &pseudo {
            match field.name.as_ref() {
                b":status" => {
                    let s = std::str::from_utf8(&field.value).map_err(|_| Error::other("invalid :status"))?;
                    status = Some(s.parse::<u16>().ok().and_then(|code| StatusCode::from_u16(code).ok()).ok_or_else(|| Error::other("invalid :status"))?);
                }
                other => {
                    return Err(Error::other(format!(
                        "unexpected pseudo-header in response: {}",
                        String::from_utf8_lossy(other)
                    )))
                }
            }
        }
        Ok((Self { status: status.ok_or_else(|| Error::other("missing :status"))? }, regular))
    }
}

/// Require that every pseudo-header field precedes every regular field,
/// then return `(pseudo, regular)`.
fn split_pseudo(fields: &[HeaderField]) -> Result<(Vec<HeaderField>, Vec<HeaderField>)> {
    let mut pseudo = Vec::new();
    let mut regular = Vec::new();
    let mut seen_regular = false;
    for field in fields {
        if is_pseudo(&field.name) {
            if seen_regular {
                return Err(Error::other("pseudo-header after regular header"));
            }
            pseudo.push(field.clone());
        } else {
            seen_regular = true;
            regular.push(field.clone());
        }
    }
    Ok((pseudo, regular))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_pseudo_headers_roundtrip() {
        let headers = RequestPseudoHeaders {
            method: Method::GET,
            scheme: Bytes::from_static(b"https"),
            authority: Bytes::from_static(b"example.com"),
            path: Bytes::from_static(b"/users/1"),
        };
        let mut fields = headers.encode();
        fields.push(HeaderField::new(Bytes::from_static(b"user-agent"), Bytes::from_static(b"test")));
        let (decoded, regular) = RequestPseudoHeaders::decode(&fields).unwrap();
        assert_eq!(decoded.method, Method::GET);
        assert_eq!(decoded.path, Bytes::from_static(b"/users/1"));
        assert_eq!(regular.len(), 1);
    }

    #[test]
    fn response_pseudo_headers_roundtrip() {
        let headers = ResponsePseudoHeaders { status: StatusCode::OK };
        let fields = headers.encode();
        let (decoded, regular) = ResponsePseudoHeaders::decode(&fields).unwrap();
        assert_eq!(decoded.status, StatusCode::OK);
        assert!(regular.is_empty());
    }

    #[test]
    fn rejects_pseudo_header_after_regular() {
        let fields = vec![
            HeaderField::new(Bytes::from_static(b"user-agent"), Bytes::from_static(b"test")),
            HeaderField::new(Bytes::from_static(b":method"), Bytes::from_static(b"GET")),
        ];
        assert!(RequestPseudoHeaders::decode(&fields).is_err());
    }

    #[test]
    fn rejects_missing_pseudo_header() {
        let fields = vec![HeaderField::new(Bytes::from_static(b":method"), Bytes::from_static(b"GET"))];
        assert!(RequestPseudoHeaders::decode(&fields).is_err());
    }
}
