//! The control stream state machine (spec.md §4.2 "Control stream"):
//! enforces that SETTINGS is the first frame, rejects a second SETTINGS,
//! and checks the monotonicity invariants on GOAWAY and MAX_PUSH_ID before
//! handing the frame up to the connection coordinator.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, ErrorScope, H3Code, H3Error};
use crate::frame::{Frame, Settings};

#[derive(Debug, PartialEq, Eq)]
pub enum ControlEvent {
    Settings(Settings),
    Goaway { id: u64 },
    MaxPushId { push_id: u64 },
    CancelPush { push_id: u64 },
    /// Ignored per RFC 9114 §9, surfaced only so callers can trace it.
    Unknown { frame_type: u64 },
}

/// Drives one direction of one connection's control stream. Both the
/// send-side bookkeeping (what this endpoint has already sent) and the
/// recv-side bookkeeping (what the peer has sent) use this type — a
/// connection owns one of each (spec.md §3 "Connection").
pub struct ControlStreamMachine {
    buf: BytesMut,
    settings_seen: bool,
    last_max_push_id: Option<u64>,
    last_goaway: Option<u64>,
}

impl Default for ControlStreamMachine {
    fn default() -> Self {
        Self { buf: BytesMut::new(), settings_seen: false, last_max_push_id: None, last_goaway: None }
    }
}

impl ControlStreamMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings_received(&self) -> bool {
        self.settings_seen
    }

    /// Feed newly read bytes; returns every complete frame's resulting
    /// event, in order. A stream-ordering violation on this stream is
    /// always connection-fatal (spec.md §4.2 "Closing the control stream
    /// is `H3_CLOSED_CRITICAL_STREAM`" / "critical" class).
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<ControlEvent>, Error> {
        self.buf.extend_from_slice(data);
        let mut events = Vec::new();
        loop {
            match Frame::decode(&self.buf).map_err(|_| {
                Error::Protocol(H3Error::connection(H3Code::FrameError))
            })? {
                None => break,
                Some((frame, consumed)) => {
                    events.push(self.apply(frame)?);
                    let _ = self.buf.split_to(consumed);
                }
            }
        }
        Ok(events)
    }

    fn apply(&mut self, frame: Frame) -> Result<ControlEvent, Error> {
        if !self.settings_seen {
            let Frame::Settings(settings) = frame else {
                return Err(connection_error(H3Code::MissingSettings));
            };
            self.settings_seen = true;
            return Ok(ControlEvent::Settings(settings));
        }

        match frame {
            Frame::Settings(_) => Err(connection_error(H3Code::SettingsError)),
            Frame::Goaway { id } => {
                if let Some(last) = self.last_goaway {
                    if id > last {
                        return Err(connection_error(H3Code::IdError));
                    }
                }
                self.last_goaway = Some(id);
                Ok(ControlEvent::Goaway { id })
            }
            Frame::MaxPushId { push_id } => {
                if let Some(last) = self.last_max_push_id {
                    if push_id < last {
                        return Err(connection_error(H3Code::IdError));
                    }
                }
                self.last_max_push_id = Some(push_id);
                Ok(ControlEvent::MaxPushId { push_id })
            }
            Frame::CancelPush { push_id } => Ok(ControlEvent::CancelPush { push_id }),
            Frame::Unknown { frame_type, .. } => Ok(ControlEvent::Unknown { frame_type }),
            Frame::Data(_) | Frame::Headers(_) | Frame::PushPromise { .. } => {
                Err(connection_error(H3Code::FrameUnexpected))
            }
        }
    }
}

fn connection_error(code: H3Code) -> Error {
    Error::Protocol(H3Error { code, scope: ErrorScope::Connection })
}

/// Encode a SETTINGS frame for transmission as the first frame on an
/// outbound control stream (spec.md §4.4 "Send on connection start").
pub fn encode_settings(settings: &Settings) -> Bytes {
    let mut buf = BytesMut::new();
    Frame::Settings(settings.clone()).encode(&mut buf);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: Frame) -> Bytes {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        buf.freeze()
    }

    #[test]
    fn first_frame_must_be_settings() {
        let mut machine = ControlStreamMachine::new();
        let err = machine.feed(&encode(Frame::Goaway { id: 0 })).unwrap_err();
        assert!(matches!(err, Error::Protocol(H3Error { code: H3Code::MissingSettings, scope: ErrorScope::Connection })));
    }

    #[test]
    fn duplicate_settings_is_an_error() {
        let mut machine = ControlStreamMachine::new();
        machine.feed(&encode(Frame::Settings(Settings::default()))).unwrap();
        let err = machine.feed(&encode(Frame::Settings(Settings::default()))).unwrap_err();
        assert!(matches!(err, Error::Protocol(H3Error { code: H3Code::SettingsError, .. })));
    }

    #[test]
    fn max_push_id_must_not_decrease() {
        let mut machine = ControlStreamMachine::new();
        machine.feed(&encode(Frame::Settings(Settings::default()))).unwrap();
        machine.feed(&encode(Frame::MaxPushId { push_id: 10 })).unwrap();
        let err = machine.feed(&encode(Frame::MaxPushId { push_id: 9 })).unwrap_err();
        assert!(matches!(err, Error::Protocol(H3Error { code: H3Code::IdError, .. })));
        machine.feed(&encode(Frame::MaxPushId { push_id: 10 })).unwrap(); // equal is fine
    }

    #[test]
    fn goaway_must_not_increase() {
        let mut machine = ControlStreamMachine::new();
        machine.feed(&encode(Frame::Settings(Settings::default()))).unwrap();
        machine.feed(&encode(Frame::Goaway { id: 20 })).unwrap();
        let err = machine.feed(&encode(Frame::Goaway { id: 21 })).unwrap_err();
        assert!(matches!(err, Error::Protocol(H3Error { code: H3Code::IdError, .. })));
    }

    #[test]
    fn unknown_frames_after_settings_are_ignored_not_errors() {
        let mut machine = ControlStreamMachine::new();
        machine.feed(&encode(Frame::Settings(Settings::default()))).unwrap();
        let events = machine.feed(&encode(Frame::Unknown { frame_type: 0x21, payload: Bytes::new() })).unwrap();
        assert_eq!(events, vec![ControlEvent::Unknown { frame_type: 0x21 }]);
    }

    #[test]
    fn data_frame_on_control_stream_is_frame_unexpected() {
        let mut machine = ControlStreamMachine::new();
        machine.feed(&encode(Frame::Settings(Settings::default()))).unwrap();
        let err = machine.feed(&encode(Frame::Data(Bytes::from_static(b"x")))).unwrap_err();
        assert!(matches!(err, Error::Protocol(H3Error { code: H3Code::FrameUnexpected, .. })));
    }
}
