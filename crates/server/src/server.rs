//! Listening socket ownership and the accept loop
//!
//! The server owns the listener for its whole life; workers own only their
//! accepted sockets. Connections are dispatched to a bounded worker pool
//! (semaphore permits); when the pool is exhausted the connection is
//! rejected with an error response instead of queueing without bound.
//! Shutdown is an explicit handle that flips an atomic flag and wakes the
//! accept loop, then waits for in-flight workers to drain.

use crate::codec;
use crate::connection;
use crate::engine::InferenceEngine;
use finserve_common::config::ServerConfig;
use finserve_common::{FinserveError, Result, METRICS};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Handle for requesting a graceful stop of a running server
#[derive(Clone)]
pub struct ShutdownHandle {
    stopping: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            stopping: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Request shutdown: the accept loop exits on its next wake.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        // notify_one stores a wakeup even if the loop is not waiting yet.
        self.notify.notify_one();
    }

    /// Whether shutdown has been requested
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// TCP prediction server: listener, accept loop, worker dispatch
pub struct PredictionServer {
    listener: TcpListener,
    engine: InferenceEngine,
    config: ServerConfig,
    shutdown: ShutdownHandle,
}

impl PredictionServer {
    /// Bind the listening socket with address reuse enabled.
    ///
    /// Must run inside a tokio runtime. Bind or listen failure is a startup
    /// error; the caller is expected to exit non-zero.
    pub fn bind(config: &ServerConfig, engine: InferenceEngine) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.limits.accept_backlog)?;

        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            engine,
            config: config.clone(),
            shutdown: ShutdownHandle::new(),
        })
    }

    /// The address actually bound (useful when the configured port is 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Get a handle that can stop this server from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run the accept loop until stopped.
    ///
    /// Accept errors are logged and never terminate the loop; only a
    /// shutdown request does. The loop never waits on a worker: accepted
    /// connections are spawned and it returns straight to accept.
    pub async fn serve(self) -> Result<()> {
        let Self {
            listener,
            engine,
            config,
            shutdown,
        } = self;

        let pool_size = config.limits.max_connections;
        let permits = Arc::new(Semaphore::new(pool_size));
        info!("Accepting prediction requests (worker pool size {})", pool_size);

        loop {
            if shutdown.is_stopping() {
                break;
            }

            tokio::select! {
                _ = shutdown.notify.notified() => {
                    // Re-check the flag at the top of the loop.
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            match permits.clone().try_acquire_owned() {
                                Ok(permit) => {
                                    let engine = engine.clone();
                                    let limits = config.limits.clone();
                                    tokio::spawn(async move {
                                        connection::handle_connection(stream, peer, engine, limits)
                                            .await;
                                        drop(permit);
                                    });
                                }
                                Err(_) => {
                                    METRICS.requests.rejected_total.inc();
                                    warn!("Worker pool exhausted, rejecting connection from {}", peer);
                                    tokio::spawn(reject(stream));
                                }
                            }
                        }
                        Err(e) => {
                            warn!("accept failed: {}", e);
                        }
                    }
                }
            }
        }

        // Stop accepting before draining.
        drop(listener);
        info!("Accept loop stopped, draining in-flight connections");

        match timeout(
            config.shutdown_grace(),
            permits.acquire_many(pool_size as u32),
        )
        .await
        {
            Ok(Ok(_)) => info!("All connections drained"),
            Ok(Err(e)) => warn!("Drain failed: {}", e),
            Err(_) => warn!("Shutdown grace period elapsed with connections still in flight"),
        }

        Ok(())
    }
}

/// Backpressure path: tell the client we are full, then close.
async fn reject(mut stream: TcpStream) {
    let overloaded = FinserveError::overloaded("no worker capacity available");
    let response = codec::http_error(&overloaded.client_message());
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
