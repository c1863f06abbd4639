//! # Serialization Formats
//!
//! The transport never looks inside an encoded payload. It hands logical values
//! to a [`Serializer`] supplied by the integrator and frames whatever bytes come
//! back. Three stock formats are provided through [`SerializationFormat`].
//!
//! ## Contract
//! - `load(dump(v)) == v` for every value the application sends
//! - `load` on malformed input returns [`ProtocolError::FormatError`] and never
//!   blocks
//!
//! ## Performance Characteristics
//! - **Bincode**: fastest, binary, not self-describing outside this crate
//! - **MessagePack**: compact, binary
//! - **JSON**: human-readable, useful when sniffing traffic
//!
//! ## Usage
//! ```rust
//! use wirecall::core::serialization::{SerializationFormat, Serializer};
//! use wirecall::core::value::Value;
//!
//! let format = SerializationFormat::Json;
//! let bytes = format.dump(&Value::from("hello")).unwrap();
//! assert_eq!(format.load(&bytes).unwrap(), Value::from("hello"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::value::{Value, MAX_DEPTH};
use crate::error::{ProtocolError, Result};

/// Pluggable byte encoding for logical values.
pub trait Serializer: Send + Sync + 'static {
    /// Encode a value into bytes
    fn dump(&self, value: &Value) -> Result<Vec<u8>>;

    /// Decode bytes produced by [`Serializer::dump`]
    fn load(&self, data: &[u8]) -> Result<Value>;
}

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Binary compact format (default, fastest)
    #[default]
    Bincode,
    /// Human-readable JSON format (debugging, interop)
    Json,
    /// Compact binary format (MessagePack, efficient)
    #[serde(alias = "msgpack")]
    MessagePack,
}

impl SerializationFormat {
    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Bincode => "Bincode",
            SerializationFormat::Json => "JSON",
            SerializationFormat::MessagePack => "MessagePack",
        }
    }

    /// Parse a format from its config name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bincode" => Some(SerializationFormat::Bincode),
            "json" => Some(SerializationFormat::Json),
            "messagepack" | "msgpack" => Some(SerializationFormat::MessagePack),
            _ => None,
        }
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serializer for SerializationFormat {
    fn dump(&self, value: &Value) -> Result<Vec<u8>> {
        if value.nesting_exceeds(MAX_DEPTH) {
            return Err(ProtocolError::SerializeError(format!(
                "value nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        match self {
            SerializationFormat::Bincode => Ok(bincode::serialize(value)?),
            SerializationFormat::Json => {
                serde_json::to_vec(value).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            SerializationFormat::MessagePack => {
                rmp_serde::to_vec(value).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
        }
    }

    fn load(&self, data: &[u8]) -> Result<Value> {
        match self {
            SerializationFormat::Bincode => bincode::deserialize(data)
                .map_err(|e| ProtocolError::FormatError(e.to_string())),
            SerializationFormat::Json => {
                serde_json::from_slice(data).map_err(|e| ProtocolError::FormatError(e.to_string()))
            }
            SerializationFormat::MessagePack => rmp_serde::from_slice(data)
                .map_err(|e| ProtocolError::FormatError(e.to_string())),
        }
    }
}
