//! Listener with interruptible accept and graceful shutdown.
//!
//! State moves `Stopped -> Listening -> ShuttingDown -> Stopped` through one
//! `watch` channel. [`RpcServer::close`] flips `Listening` to `ShuttingDown`,
//! which wakes the accept loop and every idle handler, then waits for the
//! listener to report `Stopped`. That only happens after the listening socket
//! is closed and every handler task has finished, so a request that was already
//! read always gets its response before `close` returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::config::{AuthConfig, NetworkConfig, ServerConfig};
use crate::core::serialization::Serializer;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Target;
use crate::service::handler::{self, Session};
use crate::transport::connection::Connection;
use crate::transport::endpoint::{BoxStream, Endpoint, Listener};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::SHUTDOWN_TIMEOUT;

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Listening,
    ShuttingDown,
}

/// RPC server exposing one [`Target`]. Cloning shares the same server.
#[derive(Clone)]
pub struct RpcServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    config: ServerConfig,
    auth: Option<AuthConfig>,
    serializer: Arc<dyn Serializer>,
    target: Arc<dyn Target>,
    listener: tokio::sync::Mutex<Option<Listener>>,
    // Last address actually bound, so a re-listen after close reuses the port.
    bound: parking_lot::Mutex<Option<Endpoint>>,
    state: watch::Sender<ServerState>,
    registry: parking_lot::Mutex<HashMap<u64, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl RpcServer {
    pub fn new<T: Target>(
        config: ServerConfig,
        auth: Option<AuthConfig>,
        serializer: Arc<dyn Serializer>,
        target: T,
    ) -> Self {
        let (state, _) = watch::channel(ServerState::Stopped);
        Self {
            inner: Arc::new(ServerInner {
                config,
                auth,
                serializer,
                target: Arc::new(target),
                listener: tokio::sync::Mutex::new(None),
                bound: parking_lot::Mutex::new(None),
                state,
                registry: parking_lot::Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config<T: Target>(config: &NetworkConfig, target: T) -> Self {
        Self::new(
            config.server.clone(),
            config.auth.clone(),
            Arc::new(config.serialization),
            target,
        )
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Open the listening socket ahead of [`RpcServer::listen`].
    /// Returns the bound endpoint (with the real port when 0 was requested).
    pub async fn bind(&self) -> Result<Endpoint> {
        let mut slot = self.inner.listener.lock().await;
        if let Some(listener) = slot.as_ref() {
            return listener.local_endpoint();
        }

        let listener = Listener::bind(&self.bind_target()?).await?;
        let endpoint = listener.local_endpoint()?;
        *self.inner.bound.lock() = Some(endpoint.clone());
        *slot = Some(listener);
        Ok(endpoint)
    }

    fn bind_target(&self) -> Result<Endpoint> {
        match self.inner.bound.lock().clone() {
            Some(endpoint) => Ok(endpoint),
            None => Endpoint::parse(&self.inner.config.address),
        }
    }

    /// The endpoint last bound, if any
    pub fn local_addr(&self) -> Option<Endpoint> {
        self.inner.bound.lock().clone()
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.borrow()
    }

    /// Number of handler tasks currently registered (threaded mode)
    pub fn active_connections(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Accept and serve connections until [`RpcServer::close`] is called.
    ///
    /// # Errors
    /// `AlreadyListening` if the server is not stopped; bind errors.
    #[instrument(skip(self), fields(address = %self.inner.config.address))]
    pub async fn listen(&self) -> Result<()> {
        let entered = self.inner.state.send_if_modified(|state| {
            if *state == ServerState::Stopped {
                *state = ServerState::Listening;
                true
            } else {
                false
            }
        });
        if !entered {
            return Err(ProtocolError::AlreadyListening);
        }

        let listener = match self.take_listener().await {
            Ok(listener) => listener,
            Err(e) => {
                self.inner.state.send_replace(ServerState::Stopped);
                return Err(e);
            }
        };

        info!(
            threaded = self.inner.config.threaded,
            auth = self.inner.auth.is_some(),
            "Server listening"
        );
        self.accept_loop(&listener).await;

        drop(listener);
        self.join_handlers().await;
        self.inner.state.send_replace(ServerState::Stopped);
        info!("Server stopped");
        global_metrics().log_metrics();
        Ok(())
    }

    /// Stop accepting, wait for in-flight calls, then return. Safe to call more
    /// than once or on a server that never listened.
    pub async fn close(&self) {
        let mut state = self.inner.state.subscribe();
        let signalled = self.inner.state.send_if_modified(|state| {
            if *state == ServerState::Listening {
                *state = ServerState::ShuttingDown;
                true
            } else {
                false
            }
        });
        if signalled {
            info!("Shutdown requested");
        }

        let _ = state.wait_for(|s| *s == ServerState::Stopped).await;

        // A socket opened by bind() but never listened on is released too.
        if self.state() == ServerState::Stopped {
            if let Ok(mut slot) = self.inner.listener.try_lock() {
                slot.take();
            }
        }
    }

    async fn take_listener(&self) -> Result<Listener> {
        if let Some(listener) = self.inner.listener.lock().await.take() {
            return Ok(listener);
        }
        self.bind().await?;
        self.inner
            .listener
            .lock()
            .await
            .take()
            .ok_or(ProtocolError::ConnectionClosed)
    }

    async fn accept_loop(&self, listener: &Listener) {
        let mut shutdown = self.inner.state.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Accept loop interrupted");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer).await,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        // Back off so a persistent error (e.g. fd exhaustion) does not spin.
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                },
            }
        }
    }

    async fn dispatch(&self, stream: BoxStream, peer: String) {
        let config = &self.inner.config;
        let conn = Connection::new(stream, peer, self.inner.serializer.clone())
            .with_timeout(config.timeout)
            .with_max_frame_size(config.max_frame_size);

        let session = Session {
            target: self.inner.target.clone(),
            auth: self.inner.auth.clone(),
            idle_timeout: config.idle_timeout,
            verbose: config.verbose,
            shutdown: self.inner.state.subscribe(),
        };

        if !config.threaded {
            handler::serve(conn, session).await;
            return;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();

        // Held across spawn so the task's own removal cannot run before the insert.
        let mut registry = self.inner.registry.lock();
        let handle = tokio::spawn(async move {
            handler::serve(conn, session).await;
            inner.registry.lock().remove(&id);
        });
        registry.insert(id, handle);
    }

    async fn join_handlers(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .inner
            .registry
            .lock()
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        if handles.is_empty() {
            return;
        }
        info!(count = handles.len(), "Waiting for active connections to finish");

        let all = futures::future::join_all(handles);
        tokio::pin!(all);
        let results = match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut all).await {
            Ok(results) => results,
            Err(_) => {
                warn!("Handlers still running after shutdown timeout, continuing to wait");
                all.await
            }
        };

        for result in results {
            if let Err(e) = result {
                error!(error = %e, "Connection handler ended abnormally");
            }
        }
    }
}

/// Resolve once the server leaves `Listening`
pub(crate) async fn wait_for_shutdown(state: &mut watch::Receiver<ServerState>) {
    let _ = state.wait_for(|s| *s != ServerState::Listening).await;
}
