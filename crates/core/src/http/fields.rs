//! The regular (non-pseudo) header map (spec.md §3 "Request / Response" —
//! "header map"). An [`indexmap::IndexMap`]-backed multimap so that
//! insertion order survives — the same invariant `Fields` has to uphold
//! that a plain `HashMap` cannot (spec.md §8 "header insertion order of
//! non-pseudo-headers is preserved").

use bytes::Bytes;
use indexmap::IndexMap;

/// A header field name, lowercased per RFC 9114 §4.3 ("field names MUST be
/// converted to lowercase"). Distinct from `http::HeaderName` because that
/// type rejects the `:`-prefixed pseudo-header names this crate handles
/// separately in [`crate::pseudo_header`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldName(Bytes);

impl FieldName {
    pub fn new(name: impl Into<Bytes>) -> Self {
        let name = name.into();
        if name.iter().any(u8::is_ascii_uppercase) {
            Self(Bytes::from(name.iter().map(|b| b.to_ascii_lowercase()).collect::<Vec<u8>>()))
        } else {
            Self(name)
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("")
    }
}

impl From<&str> for FieldName {
    fn from(s: &str) -> Self {
        Self::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for FieldName {
    fn from(s: String) -> Self {
        Self::new(Bytes::from(s.into_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue(Bytes);

impl FieldValue {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::new(Bytes::from(s.into_bytes()))
    }
}

/// An ordered multimap of regular header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: IndexMap<FieldName, Vec<FieldValue>>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<FieldName>, value: impl Into<FieldValue>) {
        self.entries.entry(name.into()).or_default().push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.get(&FieldName::from(name)).and_then(|v| v.first())
    }

    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &FieldValue> {
        self.entries.get(&FieldName::from(name)).into_iter().flatten()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&FieldName::from(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<FieldValue>> {
        self.entries.shift_remove(&FieldName::from(name))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all `(name, value)` pairs in insertion order (values for a
    /// repeated name stay grouped together, in the order they were added).
    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, &FieldValue)> {
        self.entries.iter().flat_map(|(name, values)| values.iter().map(move |v| (name, v)))
    }
}
