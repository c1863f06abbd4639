//! # Transport Layer
//!
//! Byte streams and the framed connections built on them.
//!
//! - [`endpoint`]: TCP and Unix socket addresses, dialing and listening
//! - [`connection`]: a framed stream with deadline-bounded Simple and Stream I/O

pub mod connection;
pub mod endpoint;

pub use connection::{Connection, ConnectionState};
pub use endpoint::{Endpoint, Listener};
