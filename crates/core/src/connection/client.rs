//! The client-role connection handle (spec.md §4.4 "Client role", §4.5
//! "Public surface"): a cheap, cloneable handle around one running
//! [`coordinator::Coordinator`] task, reached exclusively through the
//! `tokio::sync::mpsc` command channel spec.md §5 describes as the only
//! cross-task boundary into a connection's owning task.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::H3Config;
use crate::error::{Error, Result};
use crate::handler::{AsyncClientHandler, PushHandlerFn, PushPromiseHandlerFn};
use crate::http::{Request, Response};
use crate::stream::Role;
use crate::transport::QuicConnection;

use super::coordinator::{Command, Coordinator};

/// One established client-side HTTP/3 connection. Cloning is cheap — every
/// clone shares the same command channel into the coordinator task.
#[derive(Clone)]
pub struct ClientConnection {
    commands_tx: mpsc::UnboundedSender<Command>,
}

fn closed() -> Error {
    Error::other("h3 connection closed")
}

impl ClientConnection {
    /// Drive `conn` through the client-role handshake (spec.md §4.4 "On
    /// construction: open one unidirectional control stream and send
    /// SETTINGS") and spawn the coordinator task that owns it for the rest
    /// of its lifetime.
    pub async fn establish<C: QuicConnection>(conn: C, config: H3Config) -> Result<Self> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let coordinator =
            Coordinator::<C>::establish(conn, Role::Client, config, None, commands_rx, events_tx, events_rx).await?;
        tokio::spawn(coordinator.run());
        Ok(Self { commands_tx })
    }

    /// Buffered-mode request (spec.md §4.5 "`DoRequest`... overloaded on
    /// the handler type" — `http_response_handler` form, expressed here as
    /// a plain `async fn` returning the assembled response rather than a
    /// callback).
    pub async fn do_request(&self, request: Request) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.commands_tx.send(Command::DoRequest { request, reply }).map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }

    /// Streaming-mode request: `handler` receives `on_headers` once and
    /// `on_body_chunk` per DATA frame (spec.md §4.2 "Async (streaming)
    /// mode"); the returned future resolves once the response body
    /// reaches FIN.
    pub async fn do_request_streaming(&self, request: Request, handler: Arc<dyn AsyncClientHandler>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands_tx.send(Command::DoRequestStreaming { request, handler, reply }).map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }

    /// Install the accept/reject decision for inbound PUSH_PROMISEs
    /// (spec.md §4.5 "`Client.SetPushPromiseHandler(f)` where
    /// `f(headers)→bool`").
    pub fn set_push_promise_handler(&self, f: PushPromiseHandlerFn) -> Result<()> {
        self.commands_tx.send(Command::SetPushPromiseHandler(f)).map_err(|_| closed())
    }

    /// Install the delivery callback for accepted pushes (spec.md §4.5
    /// "`Client.SetPushHandler(f)`").
    pub fn set_push_handler(&self, f: PushHandlerFn) -> Result<()> {
        self.commands_tx.send(Command::SetPushHandler(f)).map_err(|_| closed())
    }

    /// Raise the Push ID this client advertises to the peer via
    /// MAX_PUSH_ID (spec.md §4.4 "`SetMaxPushID(n)`" — must only ever
    /// increase; returns an error otherwise).
    pub async fn set_max_push_id(&self, push_id: u64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands_tx.send(Command::SetMaxPushId { push_id, reply }).map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }

    /// Send GOAWAY and close the connection (spec.md §4.4 "GOAWAY").
    pub fn shutdown(&self) -> Result<()> {
        self.commands_tx.send(Command::Shutdown).map_err(|_| closed())
    }
}
