//! The request/response bidirectional stream state machine (spec.md §4.2
//! "Request/response bidi stream"). One instance drives the receive side
//! of either a request stream (server role) or a response stream (client
//! role) — the frame grammar is identical, only whether PUSH_PROMISE is
//! legal differs (spec.md §4.2 "PUSH_PROMISE is received only on a
//! client's response stream before the final HEADERS").
//!
//! Header blocks are handed up as opaque bytes — decoding them is
//! [`crate::qpack::decoder::QpackDecoder`]'s job, since blocking requires
//! connection-wide dynamic-table state this sans-IO machine doesn't have.

use bytes::{Bytes, BytesMut};

use super::Role;
use crate::error::{ErrorScope, H3Code, H3Error};
use crate::frame::Frame;

#[derive(Debug, PartialEq, Eq)]
pub enum RecvEvent {
    /// `is_trailer` distinguishes the (at most one) trailing HEADERS
    /// block from the leading one.
    Headers { header_block: Bytes, is_trailer: bool },
    PushPromise { push_id: u64, header_block: Bytes },
    Data(Bytes),
    /// Emitted once, when the peer's send side closes (FIN). Trailing a
    /// `Data(empty)` per spec.md §4.2 "On FIN, invoke
    /// `on-body-chunk(empty, is_last=true)`" is the connection layer's
    /// job, not this machine's — it just reports the ordering-legal FIN.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AfterHeaders,
    AfterTrailers,
    Done,
}

pub struct RecvMachine {
    buf: BytesMut,
    state: State,
    role: Role,
}

fn stream_error(code: H3Code) -> H3Error {
    H3Error { code, scope: ErrorScope::Stream }
}

impl RecvMachine {
    pub fn new(role: Role) -> Self {
        Self { buf: BytesMut::new(), state: State::Idle, role }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Feed newly read bytes; returns every complete frame's event, in
    /// order. A grammar violation here is always stream-scoped (spec.md
    /// §4.2 "Failure policy" — "A violation on a request or push stream is
    /// a stream reset").
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<RecvEvent>, H3Error> {
        self.buf.extend_from_slice(data);
        let mut events = Vec::new();
        loop {
            let decoded = Frame::decode(&self.buf).map_err(|_| stream_error(H3Code::FrameError))?;
            match decoded {
                None => break,
                Some((frame, consumed)) => {
                    if let Some(event) = self.apply(frame)? {
                        events.push(event);
                    }
                    let _ = self.buf.split_to(consumed);
                }
            }
        }
        Ok(events)
    }

    /// The peer's send side closed. Validates that enough of the message
    /// arrived (spec.md §4.1 "Receipt of an invalid sequence...", RFC 9114
    /// §4.1 "a client-initiated stream terminates without enough of the
    /// HTTP message... `H3_REQUEST_INCOMPLETE`").
    pub fn on_fin(&mut self) -> Result<RecvEvent, H3Error> {
        match self.state {
            State::Idle => Err(stream_error(H3Code::RequestIncomplete)),
            State::AfterHeaders | State::AfterTrailers => {
                self.state = State::Done;
                Ok(RecvEvent::Done)
            }
            State::Done => Ok(RecvEvent::Done),
        }
    }

    fn apply(&mut self, frame: Frame) -> Result<Option<RecvEvent>, H3Error> {
        match frame {
            Frame::Headers(header_block) => match self.state {
                State::Idle => {
                    self.state = State::AfterHeaders;
                    Ok(Some(RecvEvent::Headers { header_block, is_trailer: false }))
                }
                State::AfterHeaders => {
                    self.state = State::AfterTrailers;
                    Ok(Some(RecvEvent::Headers { header_block, is_trailer: true }))
                }
                State::AfterTrailers | State::Done => Err(stream_error(H3Code::FrameUnexpected)),
            },
            Frame::Data(data) => match self.state {
                State::AfterHeaders => Ok(Some(RecvEvent::Data(data))),
                State::Idle | State::AfterTrailers | State::Done => Err(stream_error(H3Code::FrameUnexpected)),
            },
            Frame::PushPromise { push_id, header_block } => {
                if self.role != Role::Client || self.state != State::AfterHeaders {
                    return Err(stream_error(H3Code::FrameUnexpected));
                }
                Ok(Some(RecvEvent::PushPromise { push_id, header_block }))
            }
            Frame::Unknown { .. } => Ok(None),
            Frame::Settings(_) | Frame::Goaway { .. } | Frame::MaxPushId { .. } | Frame::CancelPush { .. } => {
                Err(stream_error(H3Code::FrameUnexpected))
            }
        }
    }
}

/// Split a buffered body into DATA frames of at most `chunk_size` bytes
/// each (spec.md §4.2 "Buffered body... each payload ≤ an
/// implementation-chosen chunk size; 2048 is typical").
pub fn encode_buffered_body(body: &[u8], chunk_size: usize) -> Vec<Bytes> {
    if body.is_empty() {
        return Vec::new();
    }
    body.chunks(chunk_size.max(1))
        .map(|chunk| {
            let mut buf = BytesMut::new();
            Frame::Data(Bytes::copy_from_slice(chunk)).encode(&mut buf);
            buf.freeze()
        })
        .collect()
}
