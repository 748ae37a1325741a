//! The role-independent half of the connection actor (spec.md §4.4, §5):
//! owns the QUIC connection, the three critical unidirectional streams, the
//! QPACK tables, and the map of active request/push streams. Runs as one
//! `tokio::task` per connection; [`super::client::ClientConnection`] and
//! [`super::server::ServerConnection`] are thin role-specific wrappers that
//! spawn it and expose the public command surface.
//!
//! Frame-level work (decoding, QPACK, blocking/resumption, push scheduling)
//! lives here since it's identical for both roles; only "what to do once a
//! header block and body are fully assembled" differs, via the
//! [`Delivery`] variant chosen when a stream starts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

use crate::config::H3Config;
use crate::error::{Error, ErrorScope, H3Code, H3Error, Result};
use crate::frame::{Frame, Settings};
use crate::handler::{
    AsyncClientHandler, AsyncServerHandler, PushHandlerFn, PushPromiseHandlerFn, RouteConfig,
};
use crate::http::{Body, Fields, PushChild, Request, Response};
use crate::pseudo_header::{RequestPseudoHeaders, ResponsePseudoHeaders};
use crate::qpack::blocked::block_key;
use crate::qpack::decoder::DecodeOutcome;
use crate::qpack::instructions::{DecoderInstruction, EncoderInstruction};
use crate::qpack::HeaderField;
use crate::router::Router;
use crate::stream::control::{encode_settings, ControlEvent, ControlStreamMachine};
use crate::stream::push::{ClientPushState, PushIdReader, ServerPushState};
use crate::stream::qpack_streams::{DecoderStreamReader, EncoderStreamReader};
use crate::stream::request::{encode_buffered_body, RecvEvent, RecvMachine};
use crate::stream::unidentified::TypeSniffer;
use crate::stream::{
    Role, UNI_STREAM_TYPE_CONTROL, UNI_STREAM_TYPE_PUSH, UNI_STREAM_TYPE_QPACK_DECODER,
    UNI_STREAM_TYPE_QPACK_ENCODER,
};
use crate::transport::{QuicConnection, QuicRecvStream, QuicSendStream, StreamId};

use super::ConnectionState;

/// High bit reserved so client-side push-promise header blocks (keyed by
/// push ID, not stream ID) can share [`crate::qpack::blocked::block_key`]'s
/// registry/pending-map without colliding with ordinary per-stream keys.
const PUSH_PROMISE_KEY_TAG: u64 = 1 << 63;

fn push_promise_key(push_id: u64) -> u64 {
    PUSH_PROMISE_KEY_TAG | push_id
}

/// What happens once a stream's header block (and, later, its body) is
/// fully assembled. Chosen when the stream starts; everything upstream of
/// this point (framing, QPACK) is role-agnostic.
enum Delivery {
    /// Headers not yet decoded — the stream has bytes buffered but nothing
    /// to act on yet.
    Pending,
    /// Buffered-mode server route: call the callback once with the whole
    /// request, then send its response.
    ServerComplete(Request, crate::handler::CompleteHandlerFn),
    /// Streaming-mode server route: headers have already produced a
    /// response (committed up front); body chunks are forwarded to the
    /// handler as they arrive, and the committed response is sent once the
    /// request body reaches FIN.
    ServerAsync { handler: Arc<dyn AsyncServerHandler>, response: Response },
    /// No route matched — send 404 once the request is fully drained.
    ServerNotFound,
    /// Client awaiting a buffered response.
    ClientComplete { response: Option<Response>, body: BytesMut, reply: oneshot::Sender<Result<Response>> },
    /// Client awaiting a streamed response.
    ClientAsync { handler: Arc<dyn AsyncClientHandler>, reply: Option<oneshot::Sender<Result<()>>> },
    /// A server-push stream being received by a client.
    PushDeliver { push_id: u64, response: Option<Response>, body: BytesMut },
}

struct StreamSlot<C: QuicConnection> {
    send: Option<C::SendStream>,
    recv: RecvMachine,
    delivery: Delivery,
}

/// Everything the coordinator loop needs to hear about, whether it
/// originated from the transport or from the public API.
pub(crate) enum Event<C: QuicConnection> {
    NewUni(C::RecvStream),
    NewBidi(C::SendStream, C::RecvStream),
    NewPush { id: StreamId, push_id: u64, first_chunk: Bytes },
    ControlData(Bytes),
    QpackEncoderData(Bytes),
    QpackDecoderData(Bytes),
    BidiData { id: StreamId, data: Bytes },
    BidiClosed { id: StreamId },
    RetryBlock { key: u64 },
    PushReady { push_id: u64, header_block: Bytes, body: Vec<Bytes> },
    Command(Command),
    AcceptError,
}

/// Cross-task requests from [`super::client::ClientConnection`] /
/// [`super::server::ServerConnection`] handles into the running
/// coordinator task.
pub(crate) enum Command {
    DoRequest { request: Request, reply: oneshot::Sender<Result<Response>> },
    DoRequestStreaming { request: Request, handler: Arc<dyn AsyncClientHandler>, reply: oneshot::Sender<Result<()>> },
    SetPushPromiseHandler(PushPromiseHandlerFn),
    SetPushHandler(PushHandlerFn),
    SetMaxPushId { push_id: u64, reply: oneshot::Sender<Result<()>> },
    Shutdown,
}

enum PushBookkeeping {
    Server(ServerPushState),
    Client(ClientPushState, HashSet<u64>, Option<PushPromiseHandlerFn>, Option<PushHandlerFn>),
}

pub(crate) struct Coordinator<C: QuicConnection> {
    conn: Arc<C>,
    role: Role,
    config: H3Config,
    state: ConnectionState,
    control_send: C::SendStream,
    qpack_enc_send: C::SendStream,
    qpack_dec_send: C::SendStream,
    control_machine: ControlStreamMachine,
    control_recv_seen: bool,
    qpack_encoder_recv_seen: bool,
    qpack_decoder_recv_seen: bool,
    streams: HashMap<StreamId, StreamSlot<C>>,
    pending_blocks: HashMap<u64, Bytes>,
    /// Server-role responses whose stream reached FIN before this
    /// connection's `settings_received` gate opened (spec.md §4.4
    /// "Settings-received barrier" — "A server MUST NOT send responses on
    /// a bidi stream until it has received the peer's SETTINGS"). Flushed
    /// in order the moment SETTINGS arrives.
    pending_responses: Vec<(StreamId, Response)>,
    router: Option<Arc<Router<RouteConfig>>>,
    push: PushBookkeeping,
    events_tx: mpsc::UnboundedSender<Event<C>>,
    events_rx: mpsc::UnboundedReceiver<Event<C>>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
}

impl<C: QuicConnection> Coordinator<C> {
    #[instrument(skip_all, fields(role = ?role))]
    pub async fn establish(
        conn: C,
        role: Role,
        config: H3Config,
        router: Option<Arc<Router<RouteConfig>>>,
        commands_rx: mpsc::UnboundedReceiver<Command>,
        events_tx: mpsc::UnboundedSender<Event<C>>,
        events_rx: mpsc::UnboundedReceiver<Event<C>>,
    ) -> Result<Self> {
        let conn = Arc::new(conn);
        let state = ConnectionState::new(config.settings.clone());

        let mut control_send = conn.open_uni().await?;
        let mut qpack_enc_send = conn.open_uni().await?;
        let mut qpack_dec_send = conn.open_uni().await?;

        let mut preface = BytesMut::new();
        crate::varint::encode(&mut preface, UNI_STREAM_TYPE_CONTROL);
        preface.extend_from_slice(&encode_settings(&state.local_settings));
        control_send.write_all(&preface).await.map_err(Error::transport)?;

        let mut enc_preface = BytesMut::new();
        crate::varint::encode(&mut enc_preface, UNI_STREAM_TYPE_QPACK_ENCODER);
        qpack_enc_send.write_all(&enc_preface).await.map_err(Error::transport)?;

        let mut dec_preface = BytesMut::new();
        crate::varint::encode(&mut dec_preface, UNI_STREAM_TYPE_QPACK_DECODER);
        qpack_dec_send.write_all(&dec_preface).await.map_err(Error::transport)?;

        let push = match role {
            Role::Server => PushBookkeeping::Server(ServerPushState::default()),
            Role::Client => {
                let mut push_state = ClientPushState::default();
                if config.settings.enable_push {
                    let push_id = config.initial_max_push_id;
                    push_state.set_max_push_id(push_id).expect("first MAX_PUSH_ID is always monotonic");
                    let mut frame = BytesMut::new();
                    Frame::MaxPushId { push_id }.encode(&mut frame);
                    control_send.write_all(&frame).await.map_err(Error::transport)?;
                }
                PushBookkeeping::Client(push_state, HashSet::new(), None, None)
            }
        };

        spawn_accept_uni_loop(conn.clone(), events_tx.clone());
        if role == Role::Server {
            spawn_accept_bidi_loop(conn.clone(), events_tx.clone());
        }

        Ok(Self {
            conn,
            role,
            config,
            state,
            control_send,
            qpack_enc_send,
            qpack_dec_send,
            control_machine: ControlStreamMachine::new(),
            control_recv_seen: false,
            qpack_encoder_recv_seen: false,
            qpack_decoder_recv_seen: false,
            streams: HashMap::new(),
            pending_blocks: HashMap::new(),
            pending_responses: Vec::new(),
            router,
            push,
            events_tx,
            events_rx,
            commands_rx,
        })
    }

    #[instrument(skip_all)]
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(err) = self.handle_event(event).await {
                                warn!(%err, "connection-fatal error, closing");
                                self.conn.close(connection_error_code(&err), b"h3 error");
                                return;
                            }
                        }
                        None => return,
                    }
                }
                command = self.commands_rx.recv() => {
                    match command {
                        Some(command) => {
                            if let Err(err) = self.handle_event(Event::Command(command)).await {
                                warn!(%err, "connection-fatal error handling command");
                                self.conn.close(connection_error_code(&err), b"h3 error");
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, event: Event<C>) -> Result<()> {
        match event {
            Event::NewUni(recv) => {
                spawn_identify_uni(recv, self.events_tx.clone());
                Ok(())
            }
            Event::NewBidi(send, recv) => {
                let id = send.id();
                if self.streams.len() >= self.config.settings.max_concurrent_streams as usize {
                    let mut send = send;
                    send.reset(H3Code::ExcessiveLoad.code());
                    return Ok(());
                }
                spawn_recv_pump(id, recv, self.events_tx.clone());
                self.streams.insert(
                    id,
                    StreamSlot { send: Some(send), recv: RecvMachine::new(self.role), delivery: Delivery::Pending },
                );
                Ok(())
            }
            Event::NewPush { id, push_id, first_chunk } => {
                self.streams.insert(
                    id,
                    StreamSlot {
                        send: None,
                        recv: RecvMachine::new(Role::Client),
                        delivery: Delivery::PushDeliver { push_id, response: None, body: BytesMut::new() },
                    },
                );
                self.handle_bidi_data(id, first_chunk).await
            }
            Event::ControlData(data) => self.handle_control_data(data).await,
            Event::QpackEncoderData(data) => self.handle_qpack_encoder_data(data).await,
            Event::QpackDecoderData(data) => self.handle_qpack_decoder_data(data).await,
            Event::BidiData { id, data } => self.handle_bidi_data(id, data).await,
            Event::BidiClosed { id } => self.handle_bidi_closed(id).await,
            Event::RetryBlock { key } => self.handle_retry_block(key).await,
            Event::PushReady { push_id, header_block, body } => {
                self.handle_push_ready(push_id, header_block, body).await
            }
            Event::Command(command) => self.handle_command(command).await,
            Event::AcceptError => Err(Error::other("accept loop terminated")),
        }
    }

    // ---- control stream -------------------------------------------------

    async fn handle_control_data(&mut self, data: Bytes) -> Result<()> {
        if self.control_recv_seen {
            // A peer may open at most one control stream (RFC 9114 §6.2.1);
            // the identify loop tags every later one the same way, so guard
            // here too.
        }
        self.control_recv_seen = true;
        let events = self.control_machine.feed(&data)?;
        for event in events {
            match event {
                ControlEvent::Settings(settings) => {
                    if let Some(instr) = self.state.apply_peer_settings(settings)? {
                        self.qpack_enc_send.write_all(&instr).await.map_err(Error::transport)?;
                    }
                    let pending = std::mem::take(&mut self.pending_responses);
                    for (stream_id, response) in pending {
                        self.send_response(stream_id, response).await?;
                    }
                }
                ControlEvent::Goaway { id } => {
                    self.state.goaway_received = Some(id);
                    debug!(id, "received GOAWAY");
                }
                ControlEvent::MaxPushId { push_id } => {
                    if let PushBookkeeping::Server(ref mut push) = self.push {
                        push.on_max_push_id(push_id);
                    }
                }
                ControlEvent::CancelPush { push_id } => {
                    if let PushBookkeeping::Server(ref mut push) = self.push {
                        push.on_cancel_push(push_id);
                    }
                }
                ControlEvent::Unknown { frame_type } => {
                    debug!(frame_type, "ignoring unknown control frame");
                }
            }
        }
        Ok(())
    }

    async fn handle_qpack_encoder_data(&mut self, data: Bytes) -> Result<()> {
        self.qpack_encoder_recv_seen = true;
        let mut offset = 0;
        loop {
            match EncoderInstruction::decode(&data[offset..]).map_err(qpack_err)? {
                None => break,
                Some((instr, consumed)) => {
                    self.state.qpack_decoder.apply_encoder_instruction(instr).map_err(qpack_err)?;
                    offset += consumed;
                }
            }
        }
        let total = self.state.qpack_decoder.insert_count();
        let increment = total - self.state.qpack_decoder_acked_count;
        if increment > 0 {
            // spec.md §4.1 "Decoder-stream instructions": inserts not
            // otherwise covered by a Section Acknowledgement still need to
            // advance the encoder's view of `knownReceivedCount`, or it can
            // never evict them. `qpack_decoder_acked_count` tracks what a
            // Section Ack has already covered, so this never reports the
            // same insertion twice.
            let mut buf = BytesMut::new();
            DecoderInstruction::InsertCountIncrement { increment }.encode(&mut buf);
            self.qpack_dec_send.write_all(&buf).await.map_err(Error::transport)?;
            self.state.qpack_decoder_acked_count = total;
            self.retry_all_blocked().await?;
        }
        Ok(())
    }

    async fn handle_qpack_decoder_data(&mut self, data: Bytes) -> Result<()> {
        self.qpack_decoder_recv_seen = true;
        let mut offset = 0;
        loop {
            match DecoderInstruction::decode(&data[offset..]).map_err(qpack_err)? {
                None => break,
                Some((instr, consumed)) => {
                    match instr {
                        DecoderInstruction::SectionAcknowledgement { stream_id } => {
                            self.state.qpack_encoder.on_section_acknowledgement(stream_id).map_err(qpack_err)?;
                        }
                        DecoderInstruction::StreamCancellation { stream_id } => {
                            self.state.qpack_encoder.on_stream_cancellation(stream_id);
                        }
                        DecoderInstruction::InsertCountIncrement { increment } => {
                            self.state.qpack_encoder.on_insert_count_increment(increment).map_err(qpack_err)?;
                        }
                    }
                    offset += consumed;
                }
            }
        }
        Ok(())
    }

    async fn retry_all_blocked(&mut self) -> Result<()> {
        let keys: Vec<u64> = self.pending_blocks.keys().copied().collect();
        for key in keys {
            self.handle_retry_block(key).await?;
        }
        Ok(())
    }

    async fn handle_retry_block(&mut self, key: u64) -> Result<()> {
        let Some(data) = self.pending_blocks.get(&key).cloned() else { return Ok(()) };
        match self.state.qpack_decoder.decode_header_block(&data).map_err(qpack_err)? {
            DecodeOutcome::Blocked { .. } => Ok(()), // still blocked, stays parked
            DecodeOutcome::Done { fields, required_insert_count } => {
                self.pending_blocks.remove(&key);
                self.state.blocked.remove(key);
                self.acknowledge_section(key, required_insert_count).await?;
                if key & PUSH_PROMISE_KEY_TAG != 0 {
                    let push_id = key & !PUSH_PROMISE_KEY_TAG;
                    self.deliver_push_promise(push_id, fields).await
                } else {
                    let stream_id = key >> 32;
                    let section = (key & 0xffff_ffff) as u32;
                    self.deliver_header_block(stream_id, section, fields).await
                }
            }
        }
    }

    async fn acknowledge_section(&mut self, key: u64, required_insert_count: u64) -> Result<()> {
        self.state.qpack_decoder_acked_count = self.state.qpack_decoder_acked_count.max(required_insert_count);
        if key & PUSH_PROMISE_KEY_TAG != 0 {
            return Ok(());
        }
        let stream_id = key >> 32;
        let mut buf = BytesMut::new();
        DecoderInstruction::SectionAcknowledgement { stream_id }.encode(&mut buf);
        self.qpack_dec_send.write_all(&buf).await.map_err(Error::transport)
    }

    /// Try to decode a header block immediately; if blocked, park it and
    /// register a wake-up with [`crate::qpack::BlockedRegistry`]. The
    /// registry's closure only reposts an [`Event::RetryBlock`] — the
    /// actual re-decode happens back in the single-threaded event loop via
    /// [`Self::handle_retry_block`], since the registry's `FnMut` can't
    /// safely hold a second borrow of `self`.
    fn try_decode_block(&mut self, key: u64, data: Bytes) -> Result<Option<(Vec<HeaderField>, u64)>> {
        match self.state.qpack_decoder.decode_header_block(&data).map_err(qpack_err)? {
            DecodeOutcome::Done { fields, required_insert_count } => Ok(Some((fields, required_insert_count))),
            DecodeOutcome::Blocked { required_insert_count } => {
                self.pending_blocks.insert(key, data);
                let tx = self.events_tx.clone();
                self.state
                    .blocked
                    .add(
                        key,
                        Box::new(move || {
                            let _ = tx.send(Event::RetryBlock { key });
                            true
                        }),
                    )
                    .map_err(qpack_err)?;
                debug!(required_insert_count, "header block blocked, parked");
                Ok(None)
            }
        }
    }

    // ---- request/response/push bidi streams ------------------------------

    async fn handle_bidi_data(&mut self, id: StreamId, data: Bytes) -> Result<()> {
        let Some(slot) = self.streams.get_mut(&id) else { return Ok(()) };
        let events = slot.recv.feed(&data).map_err(|e| stream_fatal(id, e))?;
        for event in events {
            match event {
                RecvEvent::Headers { header_block, is_trailer } => {
                    let section = if is_trailer { 1 } else { 0 };
                    let key = block_key(id, section);
                    if let Some((fields, required_insert_count)) = self.try_decode_block(key, header_block)? {
                        self.acknowledge_section(key, required_insert_count).await?;
                        self.deliver_header_block(id, section, fields).await?;
                    }
                }
                RecvEvent::PushPromise { push_id, header_block } => {
                    let key = push_promise_key(push_id);
                    if let Some((fields, _ric)) = self.try_decode_block(key, header_block)? {
                        self.deliver_push_promise(push_id, fields).await?;
                    }
                }
                RecvEvent::Data(data) => self.deliver_body_chunk(id, data, false).await?,
                RecvEvent::Done => self.deliver_body_chunk(id, Bytes::new(), true).await?,
            }
        }
        Ok(())
    }

    async fn handle_bidi_closed(&mut self, id: StreamId) -> Result<()> {
        if let Some(slot) = self.streams.get_mut(&id) {
            if !slot.recv.is_done() {
                let event = slot.recv.on_fin().map_err(|e| stream_fatal(id, e))?;
                if matches!(event, RecvEvent::Done) {
                    self.deliver_body_chunk(id, Bytes::new(), true).await?;
                }
            }
        }
        Ok(())
    }

    async fn deliver_header_block(&mut self, stream_id: StreamId, section: u32, fields: Vec<HeaderField>) -> Result<()> {
        let Some(slot) = self.streams.get_mut(&stream_id) else { return Ok(()) };
        if section == 1 {
            let mut trailers = Fields::new();
            for field in &fields {
                trailers.insert(
                    std::str::from_utf8(&field.name).unwrap_or("").to_owned(),
                    std::str::from_utf8(&field.value).unwrap_or("").to_owned(),
                );
            }
            // Buffered-mode deliveries hold the whole request/response
            // object already, so trailers merge straight in. Streaming
            // deliveries (`ServerAsync`/`ClientAsync`) only expose
            // `on_headers`/`on_body_chunk` to the application (spec.md §9
            // "should not invent new API surface"), so there is nowhere to
            // carry received trailers without adding a callback — they are
            // dropped for those two variants.
            match &mut slot.delivery {
                Delivery::ServerComplete(request, _) => request.trailers = trailers,
                Delivery::ClientComplete { response: Some(response), .. } => response.trailers = trailers,
                Delivery::PushDeliver { response: Some(response), .. } => response.trailers = trailers,
                _ => {}
            }
            return Ok(());
        }
        match self.role {
            Role::Server => {
                let (pseudo, regular) = RequestPseudoHeaders::decode(&fields).map_err(|e| {
                    warn!(%e, "malformed request pseudo-headers");
                    H3Error::stream(H3Code::MessageError)
                })?;
                let mut request = Request::new(pseudo.method, pseudo.scheme, pseudo.authority, pseudo.path.clone());
                for field in &regular {
                    request.headers.insert(
                        std::str::from_utf8(&field.name).unwrap_or("").to_owned(),
                        std::str::from_utf8(&field.value).unwrap_or("").to_owned(),
                    );
                }
                request.query_params = crate::http::request::parse_query(&pseudo.path);
                let path_only = request.path_without_query().to_vec();

                let matched = self
                    .router
                    .as_ref()
                    .and_then(|router| router.matched(&request.method, &path_only).map(|(r, p)| (r.clone(), p)));

                let slot = self.streams.get_mut(&stream_id).expect("just looked up");
                match matched {
                    Some((RouteConfig::Complete(f), params)) => {
                        request.path_params = params;
                        slot.delivery = Delivery::ServerComplete(request, f);
                    }
                    Some((RouteConfig::Async(handler), params)) => {
                        request.path_params = params;
                        let response = handler.on_headers(&request).await;
                        let slot = self.streams.get_mut(&stream_id).expect("still present");
                        slot.delivery = Delivery::ServerAsync { handler, response };
                    }
                    None => {
                        let slot = self.streams.get_mut(&stream_id).expect("still present");
                        slot.delivery = Delivery::ServerNotFound;
                    }
                }
                Ok(())
            }
            Role::Client => {
                let (pseudo, regular) = ResponsePseudoHeaders::decode(&fields).map_err(|e| {
                    warn!(%e, "malformed response pseudo-headers");
                    H3Error::stream(H3Code::MessageError)
                })?;
                let mut response = Response::new(pseudo.status);
                for field in &regular {
                    response.headers.insert(
                        std::str::from_utf8(&field.name).unwrap_or("").to_owned(),
                        std::str::from_utf8(&field.value).unwrap_or("").to_owned(),
                    );
                }
                match &mut slot.delivery {
                    Delivery::ClientComplete { response: resp_slot, .. } => *resp_slot = Some(response),
                    Delivery::ClientAsync { handler, .. } => handler.on_headers(&response).await,
                    Delivery::PushDeliver { response: resp_slot, .. } => *resp_slot = Some(response),
                    _ => {}
                }
                Ok(())
            }
        }
    }

    async fn deliver_body_chunk(&mut self, stream_id: StreamId, data: Bytes, is_last: bool) -> Result<()> {
        let Some(slot) = self.streams.get_mut(&stream_id) else { return Ok(()) };
        match std::mem::replace(&mut slot.delivery, Delivery::Pending) {
            Delivery::Pending => {
                slot.delivery = Delivery::Pending;
            }
            Delivery::ServerComplete(mut request, handler) => {
                match &mut request.body {
                    Body::Buffered(existing) => {
                        let mut combined = BytesMut::from(existing.as_ref());
                        combined.extend_from_slice(&data);
                        request.body = Body::Buffered(combined.freeze());
                    }
                    _ => request.body = Body::Buffered(data),
                }
                if is_last {
                    let mut response = Response::ok();
                    handler(&mut request, &mut response);
                    self.maybe_send_response(stream_id, response).await?;
                } else {
                    let slot = self.streams.get_mut(&stream_id).expect("still present");
                    slot.delivery = Delivery::ServerComplete(request, handler);
                }
            }
            Delivery::ServerAsync { handler, response } => {
                handler.on_body_chunk(&data, is_last).await;
                if is_last {
                    self.maybe_send_response(stream_id, response).await?;
                } else {
                    let slot = self.streams.get_mut(&stream_id).expect("still present");
                    slot.delivery = Delivery::ServerAsync { handler, response };
                }
            }
            Delivery::ServerNotFound => {
                if is_last {
                    self.maybe_send_response(stream_id, Response::not_found()).await?;
                } else {
                    let slot = self.streams.get_mut(&stream_id).expect("still present");
                    slot.delivery = Delivery::ServerNotFound;
                }
            }
            Delivery::ClientComplete { response, mut body, reply } => {
                body.extend_from_slice(&data);
                if is_last {
                    match response {
                        Some(mut response) => {
                            response.body = Body::Buffered(body.freeze());
                            let _ = reply.send(Ok(response));
                        }
                        None => {
                            let _ = reply.send(Err(H3Error::stream(H3Code::MessageError).into()));
                        }
                    }
                    self.streams.remove(&stream_id);
                } else {
                    let slot = self.streams.get_mut(&stream_id).expect("still present");
                    slot.delivery = Delivery::ClientComplete { response, body, reply };
                }
            }
            Delivery::ClientAsync { handler, mut reply } => {
                handler.on_body_chunk(&data, is_last).await;
                if is_last {
                    if let Some(reply) = reply.take() {
                        let _ = reply.send(Ok(()));
                    }
                    self.streams.remove(&stream_id);
                } else {
                    let slot = self.streams.get_mut(&stream_id).expect("still present");
                    slot.delivery = Delivery::ClientAsync { handler, reply };
                }
            }
            Delivery::PushDeliver { push_id, response, mut body } => {
                body.extend_from_slice(&data);
                if is_last {
                    if let PushBookkeeping::Client(_, rejected, _, push_handler) = &self.push {
                        if !rejected.contains(&push_id) {
                            if let (Some(mut response), Some(handler)) = (response, push_handler.clone()) {
                                response.body = Body::Buffered(body.freeze());
                                handler(response);
                            }
                        }
                    }
                    self.streams.remove(&stream_id);
                } else {
                    let slot = self.streams.get_mut(&stream_id).expect("still present");
                    slot.delivery = Delivery::PushDeliver { push_id, response, body };
                }
            }
        }
        Ok(())
    }

    /// Entry point every server-role response completion goes through
    /// (spec.md §4.4 "Settings-received barrier"): parks the response
    /// instead of encoding it if the peer's SETTINGS hasn't arrived yet.
    async fn maybe_send_response(&mut self, stream_id: StreamId, response: Response) -> Result<()> {
        if self.role == Role::Server && !self.state.settings_received {
            debug!(stream_id, "parking response until peer SETTINGS arrives");
            self.pending_responses.push((stream_id, response));
            Ok(())
        } else {
            self.send_response(stream_id, response).await
        }
    }

    async fn send_response(&mut self, stream_id: StreamId, mut response: Response) -> Result<()> {
        let status = response.status;
        let mut header_fields = ResponsePseudoHeaders { status }.encode();
        for (name, value) in response.headers.iter() {
            header_fields.push(HeaderField::new(name.as_bytes().to_vec(), value.as_bytes().to_vec()));
        }
        let encoded = self.state.qpack_encoder.encode_header_block(stream_id, &header_fields).map_err(qpack_err)?;
        if !encoded.encoder_stream_instructions.is_empty() {
            self.qpack_enc_send.write_all(&encoded.encoder_stream_instructions).await.map_err(Error::transport)?;
        }

        let mut headers_frame = BytesMut::new();
        Frame::Headers(encoded.field_line_block).encode(&mut headers_frame);

        let mut still_open = true;
        if let Some(slot) = self.streams.get_mut(&stream_id) {
            if let Some(send) = slot.send.as_mut() {
                send.write_all(&headers_frame).await.map_err(Error::transport)?;
                still_open = send_body(send, &mut response.body, self.config.body_chunk_size).await?;
            }
        }
        if still_open && !response.trailers.is_empty() {
            let mut trailer_fields = Vec::new();
            for (name, value) in response.trailers.iter() {
                trailer_fields.push(HeaderField::new(name.as_bytes().to_vec(), value.as_bytes().to_vec()));
            }
            let encoded = self.state.qpack_encoder.encode_header_block(stream_id, &trailer_fields).map_err(qpack_err)?;
            if !encoded.encoder_stream_instructions.is_empty() {
                self.qpack_enc_send.write_all(&encoded.encoder_stream_instructions).await.map_err(Error::transport)?;
            }
            let mut trailer_frame = BytesMut::new();
            Frame::Headers(encoded.field_line_block).encode(&mut trailer_frame);
            if let Some(slot) = self.streams.get_mut(&stream_id) {
                if let Some(send) = slot.send.as_mut() {
                    send.write_all(&trailer_frame).await.map_err(Error::transport)?;
                }
            }
        }
        if still_open {
            if let Some(slot) = self.streams.get_mut(&stream_id) {
                if let Some(send) = slot.send.as_mut() {
                    send.shutdown().await.map_err(Error::transport)?;
                }
            }
        }

        let pushes = std::mem::take(&mut response.pushes);
        self.schedule_pushes(stream_id, pushes).await?;
        Ok(())
    }

    async fn schedule_pushes(&mut self, parent_stream_id: StreamId, pushes: Vec<PushChild>) -> Result<()> {
        if pushes.is_empty() {
            return Ok(());
        }
        let PushBookkeeping::Server(ref mut push_state) = self.push else { return Ok(()) };
        for child in pushes {
            let Some(push_id) = push_state.try_allocate() else { break };

            let promise_headers =
                RequestPseudoHeaders { method: http::Method::GET, scheme: Bytes::from_static(b"https"), authority: Bytes::new(), path: child.path.clone() }
                    .encode();
            let mut promise_fields = promise_headers;
            for (name, value) in child.request_headers.iter() {
                promise_fields.push(HeaderField::new(name.as_bytes().to_vec(), value.as_bytes().to_vec()));
            }
            let promise_encoded =
                self.state.qpack_encoder.encode_header_block(parent_stream_id, &promise_fields).map_err(qpack_err)?;
            if !promise_encoded.encoder_stream_instructions.is_empty() {
                self.qpack_enc_send
                    .write_all(&promise_encoded.encoder_stream_instructions)
                    .await
                    .map_err(Error::transport)?;
            }
            let mut promise_frame = BytesMut::new();
            Frame::PushPromise { push_id, header_block: promise_encoded.field_line_block }.encode(&mut promise_frame);
            if let Some(slot) = self.streams.get_mut(&parent_stream_id) {
                if let Some(send) = slot.send.as_mut() {
                    send.write_all(&promise_frame).await.map_err(Error::transport)?;
                }
            }

            let mut response_fields = ResponsePseudoHeaders { status: child.response.status }.encode();
            for (name, value) in child.response.headers.iter() {
                response_fields.push(HeaderField::new(name.as_bytes().to_vec(), value.as_bytes().to_vec()));
            }
            let response_encoded =
                self.state.qpack_encoder.encode_header_block(parent_stream_id, &response_fields).map_err(qpack_err)?;
            if !response_encoded.encoder_stream_instructions.is_empty() {
                self.qpack_enc_send
                    .write_all(&response_encoded.encoder_stream_instructions)
                    .await
                    .map_err(Error::transport)?;
            }
            let body_bytes = match &child.response.body {
                Body::Buffered(b) => b.clone(),
                _ => Bytes::new(),
            };
            let body_frames = encode_buffered_body(&body_bytes, self.config.body_chunk_size);

            let tx = self.events_tx.clone();
            let delay = Duration::from_millis(self.config.push_wait_delay_ms);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Event::PushReady { push_id, header_block: response_encoded.field_line_block, body: body_frames });
            });
        }
        Ok(())
    }

    async fn handle_push_ready(&mut self, push_id: u64, header_block: Bytes, body: Vec<Bytes>) -> Result<()> {
        let PushBookkeeping::Server(ref push_state) = self.push else { return Ok(()) };
        if push_state.is_cancelled(push_id) {
            debug!(push_id, "push cancelled before send, skipping");
            return Ok(());
        }
        let mut send = self.conn.open_uni().await?;
        let mut preamble = BytesMut::new();
        crate::varint::encode(&mut preamble, UNI_STREAM_TYPE_PUSH);
        crate::varint::encode(&mut preamble, push_id);
        send.write_all(&preamble).await.map_err(Error::transport)?;
        let mut frame = BytesMut::new();
        Frame::Headers(header_block).encode(&mut frame);
        for data in body {
            frame.extend_from_slice(&data);
        }
        send.write_all(&frame).await.map_err(Error::transport)?;
        send.shutdown().await.map_err(Error::transport)
    }

    async fn deliver_push_promise(&mut self, push_id: u64, fields: Vec<HeaderField>) -> Result<()> {
        let PushBookkeeping::Client(_, rejected, handler, _) = &mut self.push else { return Ok(()) };
        let (pseudo, regular) = RequestPseudoHeaders::decode(&fields)?;
        let mut request = Request::new(pseudo.method, pseudo.scheme, pseudo.authority, pseudo.path);
        for field in &regular {
            request.headers.insert(
                std::str::from_utf8(&field.name).unwrap_or("").to_owned(),
                std::str::from_utf8(&field.value).unwrap_or("").to_owned(),
            );
        }
        let accept = handler.as_ref().map(|h| h(&request)).unwrap_or(false);
        if !accept {
            rejected.insert(push_id);
            let mut frame = BytesMut::new();
            Frame::CancelPush { push_id }.encode(&mut frame);
            self.control_send.write_all(&frame).await.map_err(Error::transport)?;
        }
        Ok(())
    }

    // ---- public-API commands --------------------------------------------

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::DoRequest { request, reply } => self.start_request(request, Delivery::ClientComplete { response: None, body: BytesMut::new(), reply }).await,
            Command::DoRequestStreaming { request, handler, reply } => {
                self.start_request(request, Delivery::ClientAsync { handler, reply: Some(reply) }).await
            }
            Command::SetPushPromiseHandler(f) => {
                if let PushBookkeeping::Client(_, _, handler, _) = &mut self.push {
                    *handler = Some(f);
                }
                Ok(())
            }
            Command::SetPushHandler(f) => {
                if let PushBookkeeping::Client(_, _, _, handler) = &mut self.push {
                    *handler = Some(f);
                }
                Ok(())
            }
            Command::SetMaxPushId { push_id, reply } => {
                let result = if let PushBookkeeping::Client(push_state, ..) = &mut self.push {
                    match push_state.set_max_push_id(push_id) {
                        Ok(()) => {
                            let mut frame = BytesMut::new();
                            Frame::MaxPushId { push_id }.encode(&mut frame);
                            self.control_send.write_all(&frame).await.map_err(Error::transport)
                        }
                        Err(()) => Err(Error::other("MAX_PUSH_ID must only increase")),
                    }
                } else {
                    Err(Error::other("SetMaxPushId is a client-only operation"))
                };
                let _ = reply.send(result);
                Ok(())
            }
            Command::Shutdown => {
                let mut frame = BytesMut::new();
                Frame::Goaway { id: 0 }.encode(&mut frame);
                let _ = self.control_send.write_all(&frame).await;
                self.conn.close(H3Code::NoError.code(), b"shutdown");
                Err(Error::other("shutdown requested"))
            }
        }
    }

    async fn start_request(&mut self, mut request: Request, delivery: Delivery) -> Result<()> {
        // spec.md §4.4 "Client role": verify `active_streams <
        // SETTINGS_MAX_CONCURRENT_STREAMS` before opening a bidi stream.
        // The peer (server) advertises this limit in its own SETTINGS; if
        // it hasn't arrived yet, fall back to our own configured default.
        let peer_limit = self
            .state
            .peer_settings
            .as_ref()
            .map(|s| s.max_concurrent_streams)
            .unwrap_or(self.config.settings.max_concurrent_streams);
        if self.streams.len() as u64 >= peer_limit {
            reject_request(delivery, H3Error::stream(H3Code::ExcessiveLoad).into());
            return Ok(());
        }

        let (mut send, recv) = self.conn.open_bidi().await?;
        let id = send.id();

        let mut header_fields = RequestPseudoHeaders {
            method: request.method.clone(),
            scheme: request.scheme.clone(),
            authority: request.authority.clone(),
            path: request.path.clone(),
        }
        .encode();
        for (name, value) in request.headers.iter() {
            header_fields.push(HeaderField::new(name.as_bytes().to_vec(), value.as_bytes().to_vec()));
        }
        let encoded = self.state.qpack_encoder.encode_header_block(id, &header_fields).map_err(qpack_err)?;
        if !encoded.encoder_stream_instructions.is_empty() {
            self.qpack_enc_send.write_all(&encoded.encoder_stream_instructions).await.map_err(Error::transport)?;
        }
        let mut headers_frame = BytesMut::new();
        Frame::Headers(encoded.field_line_block).encode(&mut headers_frame);
        send.write_all(&headers_frame).await.map_err(Error::transport)?;
        let still_open = send_body(&mut send, &mut request.body, self.config.body_chunk_size).await?;
        if still_open && !request.trailers.is_empty() {
            let mut trailer_fields = Vec::new();
            for (name, value) in request.trailers.iter() {
                trailer_fields.push(HeaderField::new(name.as_bytes().to_vec(), value.as_bytes().to_vec()));
            }
            let encoded = self.state.qpack_encoder.encode_header_block(id, &trailer_fields).map_err(qpack_err)?;
            if !encoded.encoder_stream_instructions.is_empty() {
                self.qpack_enc_send.write_all(&encoded.encoder_stream_instructions).await.map_err(Error::transport)?;
            }
            let mut trailer_frame = BytesMut::new();
            Frame::Headers(encoded.field_line_block).encode(&mut trailer_frame);
            send.write_all(&trailer_frame).await.map_err(Error::transport)?;
        }
        if still_open {
            send.shutdown().await.map_err(Error::transport)?;
        }

        spawn_recv_pump(id, recv, self.events_tx.clone());
        self.streams.insert(id, StreamSlot { send: Some(send), recv: RecvMachine::new(Role::Client), delivery });
        Ok(())
    }
}

fn qpack_err(e: crate::qpack::QpackError) -> Error {
    Error::from(e)
}

/// Fail a client request that never got a stream opened for it, without
/// tearing down the connection (spec.md §7 "Complete-mode callback
/// receives `(response, error_code)`... nonzero means the response never
/// completed").
fn reject_request(delivery: Delivery, err: Error) {
    match delivery {
        Delivery::ClientComplete { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        Delivery::ClientAsync { reply, .. } => {
            if let Some(reply) = reply {
                let _ = reply.send(Err(err));
            }
        }
        _ => {}
    }
}

fn stream_fatal(_id: StreamId, e: H3Error) -> Error {
    Error::Protocol(e)
}

/// Serialize `body` onto `send` as DATA frames (spec.md §4.2 "Sending
/// behavior"). A buffered body is chunked at `chunk_size` and written in
/// one pass; a provider callback is drained incrementally, one DATA frame
/// per non-empty read, until it reports end-of-body (`Ok(0)`). Returns
/// `true` if the stream is still open for the caller to append trailers
/// and close, or `false` if a provider error already reset it with
/// `H3_INTERNAL_ERROR` (spec.md §4.2 "Providers must be allowed to...
/// return error") — in which case the caller must not write anything
/// else.
async fn send_body<S: QuicSendStream>(send: &mut S, body: &mut Body, chunk_size: usize) -> Result<bool> {
    match body {
        Body::Empty => {}
        Body::Buffered(bytes) => {
            for frame in encode_buffered_body(bytes, chunk_size) {
                send.write_all(&frame).await.map_err(Error::transport)?;
            }
        }
        Body::Provider(provider) => {
            let mut buf = vec![0u8; chunk_size.max(1)];
            loop {
                match provider(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut frame = BytesMut::new();
                        Frame::Data(Bytes::copy_from_slice(&buf[..n])).encode(&mut frame);
                        send.write_all(&frame).await.map_err(Error::transport)?;
                    }
                    Err(err) => {
                        warn!(%err, "body provider failed, resetting stream");
                        send.reset(H3Code::InternalError.code());
                        return Ok(false);
                    }
                }
            }
        }
    }
    Ok(true)
}

fn connection_error_code(err: &Error) -> u64 {
    match err {
        Error::Protocol(e) if e.scope == ErrorScope::Connection => e.code.code(),
        Error::Protocol(_) => H3Code::InternalError.code(),
        _ => H3Code::InternalError.code(),
    }
}

fn spawn_accept_uni_loop<C: QuicConnection>(conn: Arc<C>, tx: mpsc::UnboundedSender<Event<C>>) {
    tokio::spawn(async move {
        loop {
            match conn.accept_uni().await {
                Ok(recv) => {
                    if tx.send(Event::NewUni(recv)).is_err() {
                        return;
                    }
                }
                Err(_) => {
                    let _ = tx.send(Event::AcceptError);
                    return;
                }
            }
        }
    });
}

fn spawn_accept_bidi_loop<C: QuicConnection>(conn: Arc<C>, tx: mpsc::UnboundedSender<Event<C>>) {
    tokio::spawn(async move {
        loop {
            match conn.accept_bidi().await {
                Ok((send, recv)) => {
                    if tx.send(Event::NewBidi(send, recv)).is_err() {
                        return;
                    }
                }
                Err(_) => {
                    let _ = tx.send(Event::AcceptError);
                    return;
                }
            }
        }
    });
}

/// Sniff a just-accepted unidirectional stream's type, then hand it off to
/// the appropriate per-kind pump.
fn spawn_identify_uni<C: QuicConnection>(mut recv: C::RecvStream, tx: mpsc::UnboundedSender<Event<C>>) {
    tokio::spawn(async move {
        let mut sniffer = TypeSniffer::new();
        let mut buf = [0u8; 256];
        loop {
            let Ok(n) = recv.read(&mut buf).await else { return };
            if n == 0 {
                return;
            }
            match sniffer.feed(&buf[..n]) {
                Ok(Some((stream_type, leftover))) => {
                    match stream_type {
                        t if t == UNI_STREAM_TYPE_CONTROL => pump_forward(recv, leftover, tx, Event::ControlData).await,
                        t if t == crate::stream::UNI_STREAM_TYPE_QPACK_ENCODER => {
                            pump_forward(recv, leftover, tx, Event::QpackEncoderData).await
                        }
                        t if t == UNI_STREAM_TYPE_PUSH => pump_push(recv, leftover, tx).await,
                        _ => {
                            if stream_type == crate::stream::UNI_STREAM_TYPE_QPACK_DECODER {
                                pump_forward(recv, leftover, tx, Event::QpackDecoderData).await;
                            }
                            // Any other/unknown unidirectional stream type is
                            // simply ignored (RFC 9114 §9) — no more reads.
                        }
                    }
                    return;
                }
                Ok(None) => continue,
                Err(_) => return,
            }
        }
    });
}

async fn pump_forward<C: QuicConnection>(
    mut recv: C::RecvStream,
    leftover: Bytes,
    tx: mpsc::UnboundedSender<Event<C>>,
    wrap: fn(Bytes) -> Event<C>,
) {
    if !leftover.is_empty() && tx.send(wrap(leftover)).is_err() {
        return;
    }
    let mut buf = [0u8; 4096];
    loop {
        match recv.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if tx.send(wrap(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    return;
                }
            }
        }
    }
}

async fn pump_push<C: QuicConnection>(mut recv: C::RecvStream, leftover: Bytes, tx: mpsc::UnboundedSender<Event<C>>) {
    let id = recv.id();
    let mut reader = PushIdReader::new();
    let mut pending = leftover;
    loop {
        match reader.feed(&pending) {
            Ok(Some((push_id, rest))) => {
                if tx.send(Event::NewPush { id, push_id, first_chunk: rest }).is_err() {
                    return;
                }
                break;
            }
            Ok(None) => {
                let mut buf = [0u8; 256];
                match recv.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => {
                        let mut combined = BytesMut::from(pending.as_ref());
                        combined.extend_from_slice(&buf[..n]);
                        pending = combined.freeze();
                    }
                }
            }
            Err(_) => return,
        }
    }
    let mut buf = [0u8; 4096];
    loop {
        match recv.read(&mut buf).await {
            Ok(0) | Err(_) => {
                let _ = tx.send(Event::BidiClosed { id });
                return;
            }
            Ok(n) => {
                if tx.send(Event::BidiData { id, data: Bytes::copy_from_slice(&buf[..n]) }).is_err() {
                    return;
                }
            }
        }
    }
}

fn spawn_recv_pump<C: QuicConnection>(id: StreamId, mut recv: C::RecvStream, tx: mpsc::UnboundedSender<Event<C>>) {
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match recv.read(&mut buf).await {
                Ok(0) | Err(_) => {
                    let _ = tx.send(Event::BidiClosed { id });
                    return;
                }
                Ok(n) => {
                    if tx.send(Event::BidiData { id, data: Bytes::copy_from_slice(&buf[..n]) }).is_err() {
                        return;
                    }
                }
            }
        }
    });
}
