//! # wirecall
//!
//! A length-framed RPC transport. A server exposes a [`Target`] over TCP or a
//! Unix socket; clients call its methods by name with dynamic [`Value`]
//! arguments.
//!
//! ## Features
//! - Decimal-length framing with deadline-bounded I/O
//! - Optional per-connection password handshake (AES-256-CBC challenge)
//! - One-shot, persistent and pooled client connections
//! - In-band callbacks: a target can call back into the client mid-call
//! - Graceful server shutdown that never cuts off an in-flight call
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use wirecall::config::{ClientConfig, ServerConfig};
//! use wirecall::core::serialization::SerializationFormat;
//! use wirecall::{Dispatcher, RpcClient, RpcServer, Value};
//!
//! # async fn demo() -> wirecall::error::Result<()> {
//! let dispatcher = Dispatcher::new();
//! dispatcher.register_fn("add", |args| {
//!     let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
//!     Ok(Value::Int(sum))
//! })?;
//!
//! let server = RpcServer::new(
//!     ServerConfig::default(),
//!     None,
//!     Arc::new(SerializationFormat::Bincode),
//!     dispatcher,
//! );
//! let listening = server.clone();
//! tokio::spawn(async move { listening.listen().await });
//!
//! let client = RpcClient::new(
//!     ClientConfig::default(),
//!     None,
//!     Arc::new(SerializationFormat::Bincode),
//! )?;
//! let sum: i64 = client.call_as("add", vec![1i64.into(), 2i64.into()]).await?;
//! assert_eq!(sum, 3);
//!
//! server.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Security
//! The handshake derives its key by concatenating the salt and the shared
//! secret. It keeps casual clients out; it does not make the channel secret.

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::serialization::{SerializationFormat, Serializer};
pub use crate::core::value::Value;
pub use crate::error::{ProtocolError, RemoteError, Result};
pub use crate::protocol::dispatcher::{Dispatcher, Target, Yielder};
pub use crate::service::client::RpcClient;
pub use crate::service::server::{RpcServer, ServerState};
