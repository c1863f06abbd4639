//! # Error Types
//!
//! Error handling for the RPC transport.
//!
//! Every fallible operation in this crate returns [`ProtocolError`]. The variants
//! fall into groups that callers are expected to tell apart:
//!
//! ## Error Categories
//! - **Transport**: I/O failures, peer disconnects, malformed frames
//! - **Timeout**: a deadline elapsed; the connection must be discarded
//! - **Authentication**: the handshake was explicitly rejected
//! - **Remote**: the target raised an application error ([`RemoteError`])
//! - **Format**: the serializer could not decode a payload
//!
//! Transport and timeout errors are never converted into [`ProtocolError::Remote`].
//!
//! ## Example Usage
//! ```rust
//! use wirecall::error::{ProtocolError, RemoteError};
//!
//! fn describe(err: &ProtocolError) -> &'static str {
//!     if err.is_remote() {
//!         "the remote call failed"
//!     } else if err.is_transport() {
//!         "the network failed"
//!     } else {
//!         "local failure"
//!     }
//! }
//!
//! let err = ProtocolError::Remote(RemoteError::new("ValueError", "bad input"));
//! assert_eq!(describe(&err), "the remote call failed");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Static error strings shared by the protocol layers.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Framing errors
    pub const ERR_INVALID_LENGTH_PREFIX: &str = "Frame length prefix is not a decimal number";
    pub const ERR_TRUNCATED_FRAME: &str = "Stream closed in the middle of a frame";

    /// Connection errors
    pub const ERR_NO_RESPONSE: &str = "Peer closed the connection before responding";

    /// Handshake errors
    pub const ERR_NO_SALT: &str = "Server closed the connection before sending a salt";
    pub const ERR_BAD_ACK: &str = "Server rejected the password";
    pub const ERR_CIPHER_INIT: &str = "Invalid key or IV length";
    pub const ERR_CHALLENGE_TOO_SHORT: &str = "Challenge shorter than one cipher block";

    /// Call errors
    pub const ERR_MALFORMED_REQUEST: &str = "Malformed request tuple";
    pub const ERR_MALFORMED_RESPONSE: &str = "Malformed response tuple";
    pub const ERR_NO_CALLBACK: &str = "Call did not declare a callback";
    pub const ERR_CALLBACK_GONE: &str = "Callback channel closed before a reply arrived";
    pub const ERR_UNKNOWN_METHOD: &str = "Unknown method";
}

/// A description of an error raised by the remote target.
///
/// Shipped inside a FAILURE response. The `trace` lines are whatever context the
/// target chose to attach and are carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Short classifier, e.g. `UnknownMethod` or `ValueError`
    pub kind: String,
    /// Human-readable description
    pub message: String,
    /// Optional trace/context lines from the remote side
    pub trace: Vec<String>,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// Attach a trace line
    pub fn with_trace(mut self, line: impl Into<String>) -> Self {
        self.trace.push(line.into());
        self
    }

    /// Error for a method name the target does not know
    pub fn unknown_method(method: &str) -> Self {
        Self::new(
            "UnknownMethod",
            format!("{}: {method}", constants::ERR_UNKNOWN_METHOD),
        )
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for line in &self.trace {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Format error: {0}")]
    FormatError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),

    #[error("Frame too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Server is already listening")]
    AlreadyListening,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// True for failures of the network or the framing on it
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::InvalidHeader(_)
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::UnexpectedMessage(_)
                | ProtocolError::Timeout
        )
    }

    /// True when the target itself raised
    pub fn is_remote(&self) -> bool {
        matches!(self, ProtocolError::Remote(_))
    }

    /// Whether the connection this error came from can still be used.
    ///
    /// Remote failures complete the exchange cleanly; anything that happened
    /// mid-exchange leaves the stream in an unknown position.
    pub fn leaves_connection_usable(&self) -> bool {
        self.is_remote()
    }
}

impl From<RemoteError> for ProtocolError {
    fn from(err: RemoteError) -> Self {
        ProtocolError::Remote(err)
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_disjoint() {
        let remote = ProtocolError::Remote(RemoteError::unknown_method("nope"));
        assert!(remote.is_remote());
        assert!(!remote.is_transport());

        for err in [
            ProtocolError::Timeout,
            ProtocolError::ConnectionClosed,
            ProtocolError::Io(io::Error::from(io::ErrorKind::ConnectionReset)),
        ] {
            assert!(err.is_transport());
            assert!(!err.is_remote());
            assert!(!err.leaves_connection_usable());
        }
    }

    #[test]
    fn test_remote_error_display_keeps_trace() {
        let err = RemoteError::new("ZeroDivisionError", "division by zero")
            .with_trace("at divide()")
            .with_trace("at handler()");
        let text = err.to_string();
        assert!(text.starts_with("ZeroDivisionError: division by zero"));
        assert!(text.contains("at divide()"));
        assert!(text.contains("at handler()"));
    }
}
