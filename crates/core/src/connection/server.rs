//! The server-role connection handle (spec.md §4.4 "Server role"): spawns
//! one [`coordinator::Coordinator`] task per accepted QUIC connection, bound
//! to a shared [`Router`]. Unlike [`super::client::ClientConnection`], an
//! application never calls back into a live server connection directly —
//! [`crate::Server`] only needs enough of a handle to ask it to shut down
//! and to know when it has finished.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::H3Config;
use crate::error::Result;
use crate::handler::RouteConfig;
use crate::router::Router;
use crate::stream::Role;
use crate::transport::QuicConnection;

use super::coordinator::{Command, Coordinator};

/// A running server-side connection. Dropping this handle does not tear
/// the connection down — only [`ServerConnection::shutdown`] (or the peer
/// closing) does; the handle exists so [`crate::Server::stop`] can reach
/// every live connection and [`crate::Server::join`] can wait for them.
pub struct ServerConnection {
    commands_tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl ServerConnection {
    /// Accept `conn` as a server-role HTTP/3 connection: send SETTINGS on a
    /// fresh control stream, then run the coordinator loop against `router`
    /// for the rest of the connection's lifetime (spec.md §4.4 "Server
    /// role").
    pub async fn establish<C: QuicConnection>(
        conn: C,
        config: H3Config,
        router: Arc<Router<RouteConfig>>,
    ) -> Result<Self> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::<C>::establish(
            conn,
            Role::Server,
            config,
            Some(router),
            commands_rx,
            events_tx,
            events_rx,
        )
        .await?;
        let task = tokio::spawn(async move {
            coordinator.run().await;
        });
        Ok(Self { commands_tx, task })
    }

    /// Send GOAWAY and close this one connection (spec.md §4.4 "GOAWAY" —
    /// invoked for every live connection by [`crate::Server::stop`]).
    pub fn shutdown(&self) {
        let _ = self.commands_tx.send(Command::Shutdown);
    }

    /// Resolve once the coordinator task driving this connection exits,
    /// for any reason.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            warn!(%err, "server connection task panicked");
        }
    }
}
