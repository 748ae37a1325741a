//! The blocked-block registry (spec.md §3 "Blocked-block registry"): header
//! blocks whose `RequiredInsertCount` exceeds the current insert count are
//! parked here, keyed by `(stream_id << 32) | section_number`, until an
//! encoder-stream insertion or a cancellation resolves them.

use std::collections::HashMap;

use super::QpackError;

/// A parked header block's resumption callback. Returns `true` once the
/// block has been fully decoded (and the registry should forget it),
/// `false` if it is still blocked (left registered for the next retry).
pub type RetryFn = Box<dyn FnMut() -> bool + Send>;

/// Pack `(stream_id, section_number)` into the registry key per spec.md §3.
pub fn block_key(stream_id: u64, section_number: u32) -> u64 {
    (stream_id << 32) | section_number as u64
}

pub struct BlockedRegistry {
    pending: HashMap<u64, RetryFn>,
    /// `SETTINGS_QPACK_BLOCKED_STREAMS` — exceeding this is a connection
    /// error (spec.md §3).
    max_blocked: usize,
}

impl BlockedRegistry {
    pub fn new(max_blocked: usize) -> Self {
        Self { pending: HashMap::new(), max_blocked }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Register a blocked header block. Fails with
    /// `QPACK_DECOMPRESSION_FAILED` if the connection's concurrently-blocked
    /// limit would be exceeded.
    pub fn add(&mut self, key: u64, retry: RetryFn) -> Result<(), QpackError> {
        if self.pending.len() >= self.max_blocked && !self.pending.contains_key(&key) {
            return Err(QpackError::DecompressionFailed(format!(
                "blocked-streams limit ({}) exceeded",
                self.max_blocked
            )));
        }
        self.pending.insert(key, retry);
        Ok(())
    }

    /// A single targeted retry for `key` (spec.md §3 "a decoder-side
    /// Section Acknowledgement (key matches) triggers a single retry for
    /// that key and removes it"). Returns whether the key was present.
    pub fn ack(&mut self, key: u64) -> bool {
        if let Some(mut retry) = self.pending.remove(&key) {
            retry();
            true
        } else {
            false
        }
    }

    /// Stream reset/cancellation: drop the entry without invoking it
    /// (spec.md §8 scenario 6).
    pub fn remove(&mut self, key: u64) -> bool {
        self.pending.remove(&key).is_some()
    }

    /// An encoder-stream insertion advanced the insert count: retry every
    /// registered closure once, keeping only those that report still
    /// blocked.
    pub fn notify_all(&mut self) {
        let keys: Vec<u64> = self.pending.keys().copied().collect();
        for key in keys {
            let Some(retry) = self.pending.get_mut(&key) else { continue };
            if retry() {
                self.pending.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notify_all_resumes_only_unblocked_entries() {
        let mut registry = BlockedRegistry::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        // Resumes on its second invocation.
        registry
            .add(
                block_key(4, 1),
                Box::new(move || {
                    let n = calls2.fetch_add(1, Ordering::SeqCst);
                    n >= 1
                }),
            )
            .unwrap();

        registry.notify_all();
        assert_eq!(registry.len(), 1, "still blocked after first retry");
        registry.notify_all();
        assert_eq!(registry.len(), 0, "resumed on second retry");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_does_not_invoke_closure() {
        let mut registry = BlockedRegistry::new(16);
        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked2 = invoked.clone();
        registry
            .add(
                block_key(8, 1),
                Box::new(move || {
                    invoked2.fetch_add(1, Ordering::SeqCst);
                    true
                }),
            )
            .unwrap();
        assert!(registry.remove(block_key(8, 1)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn exceeding_blocked_limit_is_an_error() {
        let mut registry = BlockedRegistry::new(1);
        registry.add(block_key(1, 1), Box::new(|| false)).unwrap();
        assert!(registry.add(block_key(2, 1), Box::new(|| false)).is_err());
    }

    #[test]
    fn ack_retries_exactly_once_and_removes() {
        let mut registry = BlockedRegistry::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        registry
            .add(
                block_key(2, 1),
                Box::new(move || {
                    calls2.fetch_add(1, Ordering::SeqCst);
                    true
                }),
            )
            .unwrap();
        assert!(registry.ack(block_key(2, 1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert!(!registry.ack(block_key(2, 1)));
    }
}
