//! Password handshake run once per connection, before any request.
//!
//! ```text
//! server -> client   salt                      (salt_size random bytes)
//! client -> server   iv || AES-256-CBC(password) under key = salt || secret
//! server -> client   b"C" | b"F"               (omitted with fast_auth)
//! ```
//!
//! All three frames use Simple mode so no serializer is involved. The key
//! derivation has no stretching; see [`crate::utils::crypto`].
//!
//! With `fast_auth` the client never learns about a rejected password directly:
//! the server just drops the connection and the next read fails.

use tracing::{debug, instrument, warn};

use crate::config::AuthConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::connection::{Connection, ConnectionState};
use crate::utils::crypto::{constant_time_eq, random_bytes, Crypto};
use crate::utils::metrics::global_metrics;

/// Acknowledgement byte for an accepted password
pub const ACK_SUCCESS: u8 = b'C';

/// Acknowledgement byte for a rejected password
pub const ACK_FAILURE: u8 = b'F';

/// Smallest salt the server sends. A zero-length frame reads as end of stream.
pub const MIN_SALT_SIZE: usize = 1;

/// Prove knowledge of the password to the server.
///
/// # Errors
/// `AuthenticationError` when the server answers anything but `C`, transport
/// errors if the stream fails, `Timeout` if the server never answers.
#[instrument(skip_all, fields(peer = %conn.peer()))]
pub async fn client_authenticate(conn: &mut Connection, auth: &AuthConfig) -> Result<()> {
    conn.set_state(ConnectionState::Authenticating);
    global_metrics().handshake_attempt();

    let result = client_exchange(conn, auth).await;
    match &result {
        Ok(()) => {
            global_metrics().handshake_success();
            conn.set_state(ConnectionState::Idle);
            debug!("Client handshake complete");
        }
        Err(e) => {
            global_metrics().handshake_failed();
            warn!(error = %e, "Client handshake failed");
        }
    }
    result
}

async fn client_exchange(conn: &mut Connection, auth: &AuthConfig) -> Result<()> {
    let salt = match conn.recv_raw().await? {
        Some(salt) => salt,
        None => {
            debug!("{}", constants::ERR_NO_SALT);
            return Err(ProtocolError::ConnectionClosed);
        }
    };

    let crypto = Crypto::from_salt_and_secret(&salt, auth.secret.as_bytes());
    let challenge = crypto.seal(auth.password.as_bytes())?;
    conn.send_raw(&challenge).await?;

    if auth.fast_auth {
        return Ok(());
    }

    match conn.recv_raw().await? {
        Some(ack) if ack.as_ref() == [ACK_SUCCESS] => Ok(()),
        _ => Err(ProtocolError::AuthenticationError(constants::ERR_BAD_ACK.into())),
    }
}

/// Challenge a freshly accepted client.
///
/// Returns `Ok(false)` for a wrong password or an undecryptable challenge; the
/// caller must then close the connection. `Err` is reserved for transport
/// failures.
#[instrument(skip_all, fields(peer = %conn.peer()))]
pub async fn server_authenticate(conn: &mut Connection, auth: &AuthConfig) -> Result<bool> {
    conn.set_state(ConnectionState::Authenticating);
    global_metrics().handshake_attempt();

    let accepted = server_exchange(conn, auth).await;
    match accepted {
        Ok(true) => {
            global_metrics().handshake_success();
            conn.set_state(ConnectionState::Idle);
            debug!("Client authenticated");
        }
        Ok(false) => {
            global_metrics().handshake_failed();
            warn!("Client failed authentication");
        }
        Err(ref e) => {
            global_metrics().handshake_failed();
            debug!(error = %e, "Handshake aborted");
        }
    }
    accepted
}

async fn server_exchange(conn: &mut Connection, auth: &AuthConfig) -> Result<bool> {
    let salt = random_bytes(auth.salt_size.max(MIN_SALT_SIZE));
    conn.send_raw(&salt).await?;

    let Some(challenge) = conn.recv_raw().await? else {
        return Ok(false);
    };

    let crypto = Crypto::from_salt_and_secret(&salt, auth.secret.as_bytes());
    let accepted = match crypto.open(&challenge) {
        Ok(password) => constant_time_eq(&password, auth.password.as_bytes()),
        Err(e) => {
            debug!(error = %e, "Challenge did not decrypt");
            false
        }
    };

    if !auth.fast_auth {
        let ack = if accepted { ACK_SUCCESS } else { ACK_FAILURE };
        conn.send_raw(&[ack]).await?;
    }

    Ok(accepted)
}
