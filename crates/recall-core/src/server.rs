//! The session server loop.
//!
//! One task accepts connections in order. Each connection carries exactly
//! one request and gets exactly one response; the next connection is not
//! accepted until the current one is answered. The [`Session`] also sits
//! behind a mutex held for the whole dispatch. Submissions evaluate on a
//! blocking thread that owns the lock guard, so SIGINT/SIGTERM are still
//! seen while one runs.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::addr::Address;
use crate::error::{Error, Result};
use crate::ipc::{Connection, Listener, MAX_FRAME_BYTES, Request, Response};
use crate::ipc::{read_message, write_message};
use crate::session::{Session, load_source};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub address: Address,
    /// Largest request frame accepted.
    pub max_frame_bytes: usize,
}

impl ServerConfig {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: Address::Tcp(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))),
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

/// A bound session server, ready to [`run`](Server::run).
pub struct Server {
    listener: Listener,
    address: Address,
    session: Arc<Mutex<Session>>,
    max_frame_bytes: usize,
}

/// Why [`Server::run`] returned. The address is released in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopped {
    /// A client sent a shutdown request.
    Requested,
    /// SIGINT or SIGTERM arrived between requests.
    Signal,
    /// SIGINT or SIGTERM arrived while a submission was evaluating.
    ///
    /// The evaluation thread cannot be cancelled and keeps the runtime from
    /// shutting down, so callers should exit the process.
    Interrupted,
}

impl Server {
    /// Bind the configured address and seed a fresh session.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = Listener::bind(&config.address).await?;
        let address = listener.local_address()?;
        tracing::info!("Session listening on {} ({})", address, address.transport());

        Ok(Self {
            listener,
            session: Arc::new(Mutex::new(Session::new(address.clone()))),
            address,
            max_frame_bytes: config.max_frame_bytes,
        })
    }

    /// The bound address. For TCP port 0 this carries the assigned port.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Serve until a shutdown request or SIGINT/SIGTERM, then release the
    /// address.
    pub async fn run(self) -> Result<Stopped> {
        let Self {
            listener,
            address,
            session,
            max_frame_bytes,
        } = self;

        let signal = shutdown_signal();
        tokio::pin!(signal);

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                () = &mut signal => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
            };
            let mut conn = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let Some(request) = receive(&mut conn, max_frame_bytes).await else {
                continue;
            };
            tracing::debug!("Dispatching {} request", request.mode());

            let (response, open) = {
                let mut guard = Arc::clone(&session).lock_owned().await;
                let response = match request {
                    Request::Execute { payload } => match load_source(payload).await {
                        Ok(source) => {
                            let evaluation = tokio::task::spawn_blocking(move || {
                                let result = guard.execute(&source);
                                (guard, result)
                            });
                            tokio::select! {
                                joined = evaluation => {
                                    let (returned, result) = joined.map_err(|e| {
                                        Error::Ipc(format!("Evaluation task failed: {}", e))
                                    })?;
                                    guard = returned;
                                    Response::Executed(result)
                                }
                                () = &mut signal => {
                                    tracing::info!("Received shutdown signal during evaluation");
                                    drop(listener);
                                    tracing::info!("Session at {} interrupted", address);
                                    return Ok(Stopped::Interrupted);
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Rejected execute request: {}", e);
                            Response::Rejected {
                                message: e.to_string(),
                            }
                        }
                    },
                    other => guard.handle(other).await,
                };
                (response, guard.is_open())
            };

            if !open {
                // The address is free by the time the client sees the ack.
                drop(listener);
                send(&mut conn, &response).await;
                tracing::info!("Session at {} shut down", address);
                return Ok(Stopped::Requested);
            }
            send(&mut conn, &response).await;
        }

        drop(listener);
        tracing::info!("Session at {} stopped", address);
        Ok(Stopped::Signal)
    }
}

/// Bind `config.address` and serve until shutdown.
pub async fn serve(config: ServerConfig) -> Result<Stopped> {
    Server::bind(config).await?.run().await
}

/// Read the request of one connection. Malformed requests are answered
/// here and yield `None`.
async fn receive(conn: &mut Connection, max_frame_bytes: usize) -> Option<Request> {
    match read_message(conn, max_frame_bytes).await {
        Ok(request) => Some(request),
        Err(Error::MalformedRequest(message)) => {
            tracing::warn!("Rejected malformed request: {}", message);
            send(conn, &Response::Rejected { message }).await;
            None
        }
        Err(e) => {
            tracing::warn!("Dropped connection: {}", e);
            None
        }
    }
}

async fn send(conn: &mut Connection, response: &Response) {
    if let Err(e) = write_message(conn, response).await {
        tracing::warn!("Failed to send response: {}", e);
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
