//! The connection coordinator (spec.md §4.4, §5 "single-task-per-connection
//! model"): one [`coordinator::Coordinator`] per QUIC connection, run as its
//! own `tokio::task`, owning every piece of per-connection state directly —
//! the QPACK tables, settings, push bookkeeping, and the map of active
//! request streams. Nothing outside that task ever touches this state;
//! other tasks (per-stream read pumps, and the public [`crate::Client`] /
//! [`crate::Server`] handles) talk to it exclusively over
//! `tokio::sync::mpsc` channels, the same cross-task boundary the teacher
//! draws around its listener/accept loops (`salvo_core::conn`).
//!
//! Split into [`client`] and [`server`] role-specific wrappers around the
//! role-independent [`coordinator::Coordinator`], mirroring the `h3` crate's
//! own `client`/`server` module split (see `security-union-h3/h3/src/server.rs`
//! in the pack) and `salvo`'s vendored fork of it.

pub mod client;
pub mod coordinator;
pub mod server;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::frame::Settings;
use crate::qpack::{BlockedRegistry, QpackDecoder, QpackEncoder};

/// Connection-wide state owned solely by the [`coordinator::Coordinator`]
/// task (spec.md §3 "Connection" — dynamic table, blocked registry,
/// settings, push bookkeeping). No lock: the single task that owns this
/// struct is the only thing that ever reads or writes it.
pub(crate) struct ConnectionState {
    pub local_settings: Settings,
    pub peer_settings: Option<Settings>,
    pub settings_received: bool,
    pub qpack_encoder: QpackEncoder,
    pub qpack_decoder: QpackDecoder,
    pub blocked: BlockedRegistry,
    /// Largest stream/push ID this endpoint has sent in a GOAWAY.
    pub goaway_sent: Option<u64>,
    /// Largest stream/push ID the peer has sent in a GOAWAY.
    pub goaway_received: Option<u64>,
    /// How much of `qpack_decoder`'s insert count this endpoint has already
    /// told the peer about, via either a Section Acknowledgement's Required
    /// Insert Count or an Insert Count Increment (spec.md §4.1
    /// "Decoder-stream instructions"). Keeps the two mechanisms from
    /// double-reporting the same insertions, which would push the peer's
    /// `knownReceivedCount` past its own total insert count.
    pub qpack_decoder_acked_count: u64,
}

impl ConnectionState {
    pub fn new(local_settings: Settings) -> Self {
        let blocked_streams = local_settings.qpack_blocked_streams as usize;
        let max_capacity = local_settings.qpack_max_table_capacity as usize;
        Self {
            qpack_decoder: QpackDecoder::new(max_capacity),
            // The encoder writes into the *peer's* mirrored dynamic table,
            // so it may not use one until the peer's SETTINGS tells us how
            // much capacity it allows (spec.md §3 "never exceeding that
            // advertised maximum") — start at zero, which makes every
            // encode fall back to static-table/literal forms until then.
            qpack_encoder: QpackEncoder::new(0, 0),
            blocked: BlockedRegistry::new(blocked_streams),
            local_settings,
            peer_settings: None,
            settings_received: false,
            goaway_sent: None,
            goaway_received: None,
            qpack_decoder_acked_count: 0,
        }
    }

    /// Apply the peer's just-received SETTINGS (spec.md §4.4 "Setting
    /// values apply immediately upon receipt"). Returns the encoder-stream
    /// instruction bytes to flush onto the QPACK encoder stream, if any.
    pub fn apply_peer_settings(&mut self, settings: Settings) -> Result<Option<Bytes>> {
        let capacity_instr = self
            .qpack_encoder
            .set_dynamic_table_capacity(settings.qpack_max_table_capacity as usize)
            .map_err(Error::from)?;
        self.qpack_encoder.set_max_blocked_streams(settings.qpack_blocked_streams as usize);
        self.peer_settings = Some(settings);
        self.settings_received = true;
        Ok(if capacity_instr.is_empty() { None } else { Some(capacity_instr) })
    }
}
