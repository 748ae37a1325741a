//! Programmatic configuration (spec.md §2 ambient stack — "a
//! `Settings`/`H3Config` struct of plain fields with `Default`, analogous
//! to the teacher's `HttpConfig`/listener builders"). `h3lib-core` never
//! reads a config file; an embedding application builds one of these in
//! code, the same way `salvo_core`'s listeners are configured.

use crate::frame::Settings;

/// Top-level configuration for either a [`crate::Client`] or a
/// [`crate::Server`].
#[derive(Debug, Clone)]
pub struct H3Config {
    /// The HTTP/3 SETTINGS this endpoint sends (spec.md §4.4).
    pub settings: Settings,
    /// Window after a PUSH_PROMISE is emitted, during which a client's
    /// CANCEL_PUSH still suppresses opening the push stream (spec.md §4.2
    /// "Server-push send stream", §5 "push_wait_delay").
    pub push_wait_delay_ms: u64,
    /// Chunk size used when serializing a buffered body into DATA frames
    /// (spec.md §4.2 "Buffered body" — "2048 is typical").
    pub body_chunk_size: usize,
    /// Push ID a client advertises via MAX_PUSH_ID right after the
    /// handshake, when `settings.enable_push` is set (spec.md §4.4 "Client
    /// role" — "the client... sends an initial MAX_PUSH_ID"). Ignored by a
    /// server.
    pub initial_max_push_id: u64,
}

impl Default for H3Config {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            push_wait_delay_ms: 50,
            body_chunk_size: 2048,
            initial_max_push_id: 1000,
        }
    }
}

impl H3Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_push_wait_delay_ms(mut self, ms: u64) -> Self {
        self.push_wait_delay_ms = ms;
        self
    }

    pub fn with_body_chunk_size(mut self, size: usize) -> Self {
        self.body_chunk_size = size;
        self
    }

    pub fn with_initial_max_push_id(mut self, id: u64) -> Self {
        self.initial_max_push_id = id;
        self
    }
}
