//! # Protocol Layer
//!
//! What travels inside the frames.
//!
//! - [`message`]: request and response tuples, status codes, remote error payloads
//! - [`handshake`]: the per-connection password challenge
//! - [`dispatcher`]: the [`Target`](dispatcher::Target) seam, yield plumbing and a
//!   method-table target

pub mod dispatcher;
pub mod handshake;
pub mod message;


pub use dispatcher::{Dispatcher, Target, Yielder};
pub use message::{Request, Response, Status};
