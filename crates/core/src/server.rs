//! `IServer` (spec.md §4.5, §6.4): the application-facing HTTP/3 server.
//! Grounded in the teacher's `Server`/`Listener` split
//! (`salvo_core::server::Server` — `new(listener)`, `try_serve`) but
//! generalized for a connection-oriented transport: `h3lib-core` accepts
//! whole QUIC *connections* from a [`QuicServerEndpoint`], not individual
//! request streams from a byte-stream listener, so `Start`/`Stop`/`Join`
//! (spec.md §6.4) read as "run the accept loop" / "GOAWAY every
//! connection" / "wait for the accept loop and all connections to finish".

use std::sync::Arc;

use http::Method;
use parking_lot::Mutex;
use tracing::warn;

use crate::config::H3Config;
use crate::connection::server::ServerConnection;
use crate::error::{Error, Result};
use crate::handler::{AsyncServerHandler, RouteConfig};
use crate::http::{Request, Response};
use crate::router::Router;
use crate::transport::QuicServerEndpoint;

struct Running {
    accept_task: tokio::task::JoinHandle<()>,
    connections: Arc<Mutex<Vec<ServerConnection>>>,
}

/// An embeddable HTTP/3 server (spec.md §4.5 "`IServer`"), generic over the
/// QUIC server endpoint that actually binds a socket (spec.md §6.1) — in
/// practice `h3lib_quinn::QuinnServerEndpoint`.
pub struct Server<E: QuicServerEndpoint> {
    endpoint: Option<E>,
    config: H3Config,
    router: Router<RouteConfig>,
    running: Mutex<Option<Running>>,
}

impl<E: QuicServerEndpoint> Server<E> {
    /// `Server(settings).Init(config)` (spec.md §6.4): `endpoint` is
    /// already bound to its listen address by the caller (binding a socket
    /// is transport/application territory, spec.md §1 "Out of scope").
    pub fn new(endpoint: E, config: H3Config) -> Self {
        Self { endpoint: Some(endpoint), config, router: Router::new(), running: Mutex::new(None) }
    }

    /// Register a buffered-mode handler (spec.md §6.4
    /// "`AddHandler(method, pattern, complete_handler)`"). Must be called
    /// before [`Self::start`] — routes are frozen into an `Arc` once the
    /// accept loop begins.
    pub fn add_handler(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Fn(&mut Request, &mut Response) + Send + Sync + 'static,
    ) -> Result<()> {
        self.router.register(method, pattern, RouteConfig::complete(handler))?;
        Ok(())
    }

    /// Register a streaming-mode handler (spec.md §6.4
    /// "`AddHandler(method, pattern, async_handler)`").
    pub fn add_handler_streaming(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl AsyncServerHandler + 'static,
    ) -> Result<()> {
        self.router.register(method, pattern, RouteConfig::async_handler(handler))?;
        Ok(())
    }

    /// `Server.Start(addr, port)` (spec.md §6.4): spawn the accept loop.
    /// The address is implicit in how `endpoint` was constructed — see the
    /// struct doc. Returns once the accept loop task has been spawned, not
    /// once it exits; use [`Self::join`] for that.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.lock().is_some() {
            return Err(Error::other("server already started"));
        }
        let endpoint = self.endpoint.take().ok_or_else(|| Error::other("server already started"))?;
        let router = Arc::new(std::mem::take(&mut self.router));
        let config = self.config.clone();
        let connections: Arc<Mutex<Vec<ServerConnection>>> = Arc::new(Mutex::new(Vec::new()));

        let accept_connections = connections.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match endpoint.accept().await {
                    Some(Ok(quic)) => {
                        let router = router.clone();
                        let config = config.clone();
                        let connections = accept_connections.clone();
                        tokio::spawn(async move {
                            match ServerConnection::establish(quic, config, router).await {
                                // The coordinator task this handle wraps is
                                // already running detached (spawned inside
                                // `establish`); retaining the handle here is
                                // only so `Server::stop` can reach it later.
                                Ok(conn) => connections.lock().push(conn),
                                Err(err) => warn!(%err, "failed to establish h3 server connection"),
                            }
                        });
                    }
                    Some(Err(err)) => warn!(%err, "quic endpoint failed to accept a connection"),
                    None => return,
                }
            }
        });

        *self.running.lock() = Some(Running { accept_task, connections });
        Ok(())
    }

    /// `Server.Stop()` (spec.md §6.4): GOAWAY every live connection. Does
    /// not wait for them to drain — call [`Self::join`] for that.
    pub fn stop(&self) {
        if let Some(running) = self.running.lock().as_ref() {
            for conn in running.connections.lock().iter() {
                conn.shutdown();
            }
        }
    }

    /// `Server.Join()` (spec.md §6.4): wait for the accept loop to exit
    /// (which happens once the endpoint itself is shut down — typically
    /// right after [`Self::stop`] tears down the transport).
    pub async fn join(&mut self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            if let Err(err) = running.accept_task.await {
                warn!(%err, "server accept loop task panicked");
            }
        }
    }
}
