//! Per-connection request loop on the server.
//!
//! The target runs in its own task so the handler can keep servicing the
//! connection while the target is suspended inside [`Yielder::call`]:
//!
//! ```text
//!   target task                handler                    client
//!   yielder.call(args) ──mpsc──> Yield(args) ─────────────>
//!                                            <───────────── reply value
//!   <────────── oneshot(reply) ─
//!   return value ──JoinHandle──> Success(value) ──────────>
//! ```
//!
//! Transport faults end only this connection. They are logged, never raised.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, instrument};

use crate::config::AuthConfig;
use crate::core::value::Value;
use crate::error::{ProtocolError, RemoteError, Result};
use crate::protocol::dispatcher::{Target, YieldRequest, Yielder};
use crate::protocol::handshake::server_authenticate;
use crate::protocol::message::{Request, Response};
use crate::service::server::{wait_for_shutdown, ServerState};
use crate::transport::connection::{Connection, ConnectionState};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::deadline_after;

/// What a handler needs from its server
pub(crate) struct Session {
    pub target: Arc<dyn Target>,
    pub auth: Option<AuthConfig>,
    pub idle_timeout: Option<Duration>,
    pub verbose: bool,
    pub shutdown: watch::Receiver<ServerState>,
}

/// Serve one accepted connection until the peer leaves or the server stops
#[instrument(skip_all, fields(peer = %conn.peer()))]
pub(crate) async fn serve(mut conn: Connection, mut session: Session) {
    debug!("Connection accepted");

    if let Err(e) = run(&mut conn, &mut session).await {
        if session.verbose {
            error!(error = %e, "Connection failed");
        } else {
            debug!(error = %e, "Connection failed");
        }
    }

    conn.close().await;
    debug!("Connection closed");
}

async fn run(conn: &mut Connection, session: &mut Session) -> Result<()> {
    if let Some(auth) = &session.auth {
        // No request is in flight yet, so shutdown may cut the handshake short.
        let accepted = tokio::select! {
            accepted = server_authenticate(conn, auth) => accepted?,
            _ = wait_for_shutdown(&mut session.shutdown) => {
                debug!("Abandoning handshake for shutdown");
                false
            }
        };
        if !accepted {
            return Ok(());
        }
    }

    loop {
        if *session.shutdown.borrow() != ServerState::Listening {
            break;
        }

        // Only the wait for the next request is interruptible; a request that
        // has been read is always answered.
        let deadline = deadline_after(session.idle_timeout);
        let frame = tokio::select! {
            frame = conn.recv_value_until(deadline) => frame?,
            _ = wait_for_shutdown(&mut session.shutdown) => {
                debug!("Closing idle connection for shutdown");
                break;
            }
        };

        let Some(frame) = frame else {
            debug!("Peer closed connection");
            break;
        };

        let request = Request::from_value(frame)?;
        let keep_alive = request.keep_alive;
        conn.set_state(ConnectionState::Busy);
        global_metrics().call_started();
        debug!(method = %request.method, callback = request.callback, "Request received");

        let response = invoke(conn, session.target.clone(), request).await?;
        conn.send_value(&response.to_value()).await?;
        conn.set_state(ConnectionState::Idle);

        if !keep_alive {
            break;
        }
    }

    Ok(())
}

/// Aborts the target task if the handler gives up on it
struct TaskGuard(JoinHandle<std::result::Result<Value, RemoteError>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the target, relaying its yields over `conn`, and build the final response
async fn invoke(conn: &mut Connection, target: Arc<dyn Target>, request: Request) -> Result<Response> {
    let Request {
        method,
        args,
        callback,
        ..
    } = request;

    let (tx, mut yields) = mpsc::channel::<YieldRequest>(1);
    let yielder = if callback {
        Yielder::new(tx)
    } else {
        drop(tx);
        Yielder::disabled()
    };

    let mut task = TaskGuard(tokio::spawn(async move {
        target.invoke(&method, args, yielder).await
    }));

    loop {
        tokio::select! {
            outcome = &mut task.0 => return Ok(into_response(outcome)),
            pending = yields.recv() => {
                let Some(YieldRequest { args, reply }) = pending else {
                    // The target dropped its yielder; only the result is left.
                    return Ok(into_response((&mut task.0).await));
                };

                conn.send_value(&Response::yielded(args).to_value()).await?;
                let answer = conn
                    .recv_value()
                    .await?
                    .ok_or(ProtocolError::ConnectionClosed)?;
                global_metrics().yield_round_trip();

                // The target may have been dropped meanwhile; its result arrives next.
                let _ = reply.send(answer);
            }
        }
    }
}

fn into_response(outcome: std::result::Result<std::result::Result<Value, RemoteError>, JoinError>) -> Response {
    match outcome {
        Ok(Ok(value)) => Response::success(value),
        Ok(Err(err)) => {
            global_metrics().call_failed();
            debug!(kind = %err.kind, message = %err.message, "Target raised");
            Response::failure(&err)
        }
        Err(join) => {
            global_metrics().call_failed();
            let err = if join.is_panic() {
                RemoteError::new("Panic", panic_message(join.into_panic()))
            } else {
                RemoteError::new("Cancelled", join.to_string())
            };
            error!(kind = %err.kind, message = %err.message, "Target task failed");
            Response::failure(&err)
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "target panicked".to_string()
    }
}
