//! # Core Protocol Components
//!
//! Low-level frame handling and value encoding.
//!
//! ## Components
//! - **Codec**: tokio codec for length-prefixed frames over byte streams
//! - **Serialization**: the [`serialization::Serializer`] seam and stock formats
//! - **Value**: the dynamic value type carried in requests and responses
//!
//! ## Wire Format
//! ```text
//! [decimal length ASCII] [0x00] [payload (length bytes)]
//! ```
//!
//! A zero length means "no frame" and is how a peer signals an orderly stop.
//!
//! ## Security
//! - Maximum frame size: 16MB by default (prevents memory exhaustion)
//! - Length prefix capped at 20 digits, validated before allocation

pub mod codec;
pub mod serialization;
pub mod value;
