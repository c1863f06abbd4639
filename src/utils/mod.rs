//! # Utility Modules
//!
//! Supporting utilities for cryptography, logging, timing and metrics.
//!
//! ## Components
//! - **Crypto**: AES-256-CBC for the password handshake, random salts
//! - **Logging**: `tracing-subscriber` setup from [`crate::config::LoggingConfig`]
//! - **Timeout**: deadline wrappers that map elapsed time to `Timeout`
//! - **Metrics**: Thread-safe observability counters
//!
//! ## Security
//! - Salts and IVs come from the OS CSPRNG (getrandom), with a logged fallback
//! - Password comparison is constant-time

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{global_metrics, Metrics, MetricsSnapshot};
