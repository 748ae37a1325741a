//! Server push bookkeeping (spec.md §3 "push bookkeeping", §4.2
//! "Server-push send stream" / "Server-push recv stream", §4.4 "Server
//! push"). A push stream's wire layout is `push_id_varint || HEADERS ||
//! DATA*`, i.e. the same frame grammar [`super::request::ResponseMachine`]
//! already drives for a normal response — this module only owns the
//! push-id bookkeeping that decides whether a push may happen at all.

use std::collections::HashSet;

use bytes::BytesMut;

use crate::varint;

/// Read the leading Push ID varint off a newly identified push stream
/// (spec.md §4.2 "push (followed by a Push ID varint, then HTTP
/// message)"). Mirrors [`super::unidentified::TypeSniffer`]'s
/// buffer-across-reads shape.
#[derive(Default)]
pub struct PushIdReader {
    buf: BytesMut,
}

impl PushIdReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> crate::error::Result<Option<(u64, bytes::Bytes)>> {
        self.buf.extend_from_slice(data);
        let Some(len) = varint::peek_len(&self.buf) else { return Ok(None) };
        if self.buf.len() < len {
            return Ok(None);
        }
        let mut head = self.buf.split_to(len);
        let push_id = varint::decode(&mut head)?;
        Ok(Some((push_id, self.buf.split_off(0).freeze())))
    }
}

/// Server-side push-id bookkeeping, owned by the connection coordinator
/// (spec.md §3 "Connection" — "the push bookkeeping (`max_push_id`,
/// `next_push_id`, cancelled set, pending push responses)").
#[derive(Debug, Default)]
pub struct ServerPushState {
    /// Highest Push ID the client has authorized via MAX_PUSH_ID.
    max_push_id: Option<u64>,
    next_push_id: u64,
    cancelled: HashSet<u64>,
}

impl ServerPushState {
    pub fn on_max_push_id(&mut self, id: u64) {
        self.max_push_id = Some(match self.max_push_id {
            Some(current) => current.max(id),
            None => id,
        });
    }

    pub fn on_cancel_push(&mut self, push_id: u64) {
        self.cancelled.insert(push_id);
    }

    pub fn is_cancelled(&self, push_id: u64) -> bool {
        self.cancelled.contains(&push_id)
    }

    /// Allocate the next Push ID if doing so stays under `max_push_id`
    /// (spec.md §4.4 "allocate a new Push ID" / §8 "Server push count ≤
    /// `max_push_id`"). Returns `None` when push is currently exhausted.
    pub fn try_allocate(&mut self) -> Option<u64> {
        let allowed = self.max_push_id?;
        if self.next_push_id >= allowed {
            return None;
        }
        let id = self.next_push_id;
        self.next_push_id += 1;
        Some(id)
    }
}

/// Client-side bookkeeping: the Push ID this client has advertised via
/// MAX_PUSH_ID (spec.md §4.4 "The client tracks `max_push_id` it has
/// advertised... must only increase").
#[derive(Debug, Default)]
pub struct ClientPushState {
    advertised_max_push_id: Option<u64>,
}

impl ClientPushState {
    /// Returns `Err(())` if `id` would not be monotonically increasing.
    pub fn set_max_push_id(&mut self, id: u64) -> Result<(), ()> {
        if let Some(current) = self.advertised_max_push_id {
            if id < current {
                return Err(());
            }
        }
        self.advertised_max_push_id = Some(id);
        Ok(())
    }

    pub fn advertised_max_push_id(&self) -> Option<u64> {
        self.advertised_max_push_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_allocates_only_below_max_push_id() {
        let mut state = ServerPushState::default();
        assert_eq!(state.try_allocate(), None);
        state.on_max_push_id(2);
        assert_eq!(state.try_allocate(), Some(0));
        assert_eq!(state.try_allocate(), Some(1));
        assert_eq!(state.try_allocate(), None, "push_id 2 would not be < max_push_id");
    }

    #[test]
    fn max_push_id_only_ever_increases() {
        let mut state = ServerPushState::default();
        state.on_max_push_id(5);
        state.on_max_push_id(3);
        assert_eq!(state.max_push_id, Some(5));
    }

    #[test]
    fn client_rejects_decreasing_max_push_id() {
        let mut state = ClientPushState::default();
        state.set_max_push_id(5).unwrap();
        assert_eq!(state.set_max_push_id(4), Err(()));
        assert_eq!(state.advertised_max_push_id(), Some(5));
    }

    #[test]
    fn push_id_reader_splits_id_from_leftover() {
        let mut reader = PushIdReader::new();
        let mut buf = BytesMut::new();
        varint::encode(&mut buf, 7);
        buf.extend_from_slice(b"headers-frame-bytes");
        let (push_id, rest) = reader.feed(&buf).unwrap().unwrap();
        assert_eq!(push_id, 7);
        assert_eq!(&rest[..], b"headers-frame-bytes");
    }
}
