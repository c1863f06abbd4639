//! Client-side connection management.
//!
//! Two modes, fixed at construction:
//!
//! - **Single**: one optional persistent connection behind an async mutex. Every
//!   call holds the mutex for its whole exchange, so calls never overlap. Without
//!   a persistent connection each call dials a temporary one and closes it.
//! - **Pooled**: a list of slots, each with its own async mutex. A call takes the
//!   first slot it can lock without waiting; if every slot is busy it falls back
//!   to a temporary connection that never joins the pool.
//!
//! A connection that saw a transport error or timeout is never put back; its
//! slot is left empty and re-dialed by the next call that picks it up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::config::AuthConfig;
use crate::core::serialization::Serializer;
use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::client_authenticate;
use crate::transport::connection::Connection;
use crate::transport::endpoint::Endpoint;

type Slot = Arc<Mutex<Option<Connection>>>;

/// Everything needed to open and authenticate a new connection
#[derive(Clone)]
pub struct Dialer {
    pub endpoint: Endpoint,
    pub timeout: Option<Duration>,
    pub auth: Option<AuthConfig>,
    pub serializer: Arc<dyn Serializer>,
    pub max_frame_size: usize,
}

impl Dialer {
    /// Connect and, when configured, run the password handshake
    pub async fn dial(&self) -> Result<Connection> {
        let mut conn = Connection::connect(
            &self.endpoint,
            self.timeout,
            self.serializer.clone(),
            self.max_frame_size,
        )
        .await?;

        if let Some(auth) = &self.auth {
            if let Err(e) = client_authenticate(&mut conn, auth).await {
                conn.close().await;
                return Err(e);
            }
        }
        Ok(conn)
    }
}

enum Mode {
    Single(Slot),
    Pooled {
        slots: parking_lot::Mutex<Vec<Slot>>,
        // Serializes resize calls; acquire never touches it.
        resizing: Mutex<()>,
    },
}

/// Hands out connections to calls
pub struct ConnectionManager {
    dialer: Dialer,
    mode: Mode,
    sweep_interval: Duration,
}

impl ConnectionManager {
    /// Non-concurrent manager: calls are serialized behind one mutex
    pub fn single(dialer: Dialer) -> Self {
        Self {
            dialer,
            mode: Mode::Single(Arc::new(Mutex::new(None))),
            sweep_interval: crate::config::DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Concurrent manager with an initially empty pool; see [`ConnectionManager::resize`]
    pub fn pooled(dialer: Dialer, sweep_interval: Duration) -> Self {
        Self {
            dialer,
            mode: Mode::Pooled {
                slots: parking_lot::Mutex::new(Vec::new()),
                resizing: Mutex::new(()),
            },
            sweep_interval,
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.mode, Mode::Pooled { .. })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.dialer.endpoint
    }

    /// Get a connection for one call
    pub async fn acquire(&self) -> Result<Lease> {
        match &self.mode {
            Mode::Single(slot) => {
                let mut guard = slot.clone().lock_owned().await;
                match guard.take() {
                    None => {
                        let conn = self.dialer.dial().await?;
                        Ok(Lease::temporary(conn, Some(guard)))
                    }
                    persistent => {
                        let conn = self.reuse_or_dial(persistent).await?;
                        Ok(Lease::reusable(conn, guard))
                    }
                }
            }
            Mode::Pooled { slots, .. } => {
                let free = {
                    let slots = slots.lock();
                    slots.iter().find_map(|slot| slot.clone().try_lock_owned().ok())
                };

                match free {
                    Some(mut guard) => {
                        let conn = self.reuse_or_dial(guard.take()).await?;
                        Ok(Lease::reusable(conn, guard))
                    }
                    None => {
                        debug!("Pool exhausted, using a temporary connection");
                        let conn = self.dialer.dial().await?;
                        Ok(Lease::temporary(conn, None))
                    }
                }
            }
        }
    }

    /// Hand back `cached` if the peer has not dropped it, otherwise dial afresh
    async fn reuse_or_dial(&self, cached: Option<Connection>) -> Result<Connection> {
        if let Some(mut conn) = cached {
            if conn.is_alive() {
                return Ok(conn);
            }
            debug!(endpoint = %self.dialer.endpoint, "Cached connection dropped, reconnecting");
        }
        self.dialer.dial().await
    }

    /// Open the persistent connection (single mode). In pooled mode the pooled
    /// connections already persist, so this does nothing.
    #[instrument(skip(self), fields(endpoint = %self.dialer.endpoint))]
    pub async fn persist(&self) -> Result<()> {
        let Mode::Single(slot) = &self.mode else {
            return Ok(());
        };

        let mut guard = slot.lock().await;
        if let Some(conn) = guard.as_mut() {
            if conn.is_alive() {
                return Ok(());
            }
        }
        *guard = Some(self.dialer.dial().await?);
        info!("Persistent connection established");
        Ok(())
    }

    /// Close the persistent connection, or every idle pooled connection
    #[instrument(skip(self), fields(endpoint = %self.dialer.endpoint))]
    pub async fn disconnect(&self) -> Result<()> {
        match &self.mode {
            Mode::Single(slot) => {
                let taken = slot.lock().await.take();
                if let Some(mut conn) = taken {
                    conn.close().await;
                    info!("Persistent connection closed");
                }
                Ok(())
            }
            Mode::Pooled { .. } => self.resize(0).await,
        }
    }

    /// Grow or shrink the pool to `target` connections.
    ///
    /// Growing dials the new connections up front. Shrinking only removes slots
    /// it can lock without waiting and sweeps again after `sweep_interval` until
    /// enough busy slots have come free.
    #[instrument(skip(self), fields(endpoint = %self.dialer.endpoint))]
    pub async fn resize(&self, target: usize) -> Result<()> {
        let Mode::Pooled { slots, resizing } = &self.mode else {
            return Err(ProtocolError::ConfigError(
                "pool resizing requires threaded mode".into(),
            ));
        };
        let _resizing = resizing.lock().await;

        let current = slots.lock().len();
        if target > current {
            for _ in current..target {
                let conn = self.dialer.dial().await?;
                slots.lock().push(Arc::new(Mutex::new(Some(conn))));
            }
            info!(size = target, "Pool grown");
            return Ok(());
        }

        let mut sweeps = 0usize;
        loop {
            let (removed, remaining) = {
                let mut slots = slots.lock();
                let mut excess = slots.len().saturating_sub(target);
                let mut removed = Vec::new();
                slots.retain(|slot| {
                    if excess == 0 {
                        return true;
                    }
                    match slot.try_lock() {
                        Ok(mut guard) => {
                            removed.extend(guard.take());
                            excess -= 1;
                            false
                        }
                        Err(_) => true,
                    }
                });
                (removed, slots.len())
            };

            for mut conn in removed {
                conn.close().await;
            }

            if remaining <= target {
                info!(size = remaining, sweeps, "Pool shrunk");
                return Ok(());
            }

            sweeps += 1;
            if sweeps % 100 == 0 {
                warn!(remaining, target, "Pool shrink still waiting for busy connections");
            }
            tokio::time::sleep(self.sweep_interval).await;
        }
    }

    /// Number of pool slots (0 in single mode)
    pub fn pool_size(&self) -> usize {
        match &self.mode {
            Mode::Single(_) => 0,
            Mode::Pooled { slots, .. } => slots.lock().len(),
        }
    }

    /// Whether a persistent connection is currently held (single mode).
    /// Returns `true` while a call holds the connection.
    pub fn is_persistent(&self) -> bool {
        match &self.mode {
            Mode::Single(slot) => match slot.try_lock() {
                Ok(guard) => guard.is_some(),
                Err(_) => true,
            },
            Mode::Pooled { .. } => false,
        }
    }
}

/// A connection checked out for exactly one call
pub struct Lease {
    conn: Connection,
    reusable: bool,
    // Held for the whole call: the slot lock in pooled mode, the call mutex in
    // single mode. Reusable connections go back in here on release.
    guard: Option<OwnedMutexGuard<Option<Connection>>>,
}

impl Lease {
    fn reusable(conn: Connection, guard: OwnedMutexGuard<Option<Connection>>) -> Self {
        Self {
            conn,
            reusable: true,
            guard: Some(guard),
        }
    }

    fn temporary(conn: Connection, guard: Option<OwnedMutexGuard<Option<Connection>>>) -> Self {
        Self {
            conn,
            reusable: false,
            guard,
        }
    }

    /// Whether the server should keep the connection open after this call
    pub fn keep_alive(&self) -> bool {
        self.reusable
    }

    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Return the connection after the call finished with `error` (if any).
    ///
    /// Temporary connections are closed. Reusable ones go back to their slot
    /// unless the error left the stream in an unknown state.
    pub async fn release(self, error: Option<&ProtocolError>) {
        let Lease {
            mut conn,
            reusable,
            guard,
        } = self;

        let healthy = error.map_or(true, ProtocolError::leaves_connection_usable);
        match guard {
            Some(mut guard) if reusable && healthy && !conn.is_closed() => {
                *guard = Some(conn);
            }
            _ => {
                if reusable {
                    debug!(peer = %conn.peer(), "Discarding connection after failed call");
                }
                conn.close().await;
            }
        }
    }
}
