//! # Service Layer
//!
//! The client and server halves of the RPC transport.
//!
//! - [`client`]: the call engine (request, yield loop, response)
//! - [`pool`]: single-connection and pooled connection management
//! - [`server`]: the listener, shutdown and handler registry
//! - `handler`: the per-connection request loop

pub mod client;
pub(crate) mod handler;
pub mod pool;
pub mod server;

pub use client::RpcClient;
pub use pool::{ConnectionManager, Lease};
pub use server::{RpcServer, ServerState};
