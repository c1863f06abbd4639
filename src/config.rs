//! # Configuration Management
//!
//! Centralized configuration for clients and servers.
//!
//! This module covers the recognized options of the transport: addresses,
//! timeouts, the password handshake, pooling, serializer choice and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`WIRECALL_*` variables)
//!
//! ## Security Considerations
//! - The password handshake deters casual access only; see
//!   [`crate::protocol::handshake`] for the key derivation caveat
//! - The default client timeout (30s) turns an auth configuration mismatch into
//!   a `Timeout` instead of a hang

use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::transport::endpoint::Endpoint;
use crate::utils::crypto::KEY_SIZE;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max allowed payload size (e.g. 16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Default number of salt bytes generated by the server
pub const DEFAULT_SALT_SIZE: usize = 10;

/// Default delay between pool shrink sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Serializer used for requests and responses
    #[serde(default)]
    pub serialization: SerializationFormat,

    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Password handshake; absent means no authentication
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("WIRECALL_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("WIRECALL_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(timeout) = std::env::var("WIRECALL_TIMEOUT_MS") {
            let millis = timeout.parse::<u64>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid WIRECALL_TIMEOUT_MS: {e}"))
            })?;
            let value = (millis > 0).then(|| Duration::from_millis(millis));
            config.server.timeout = value;
            config.client.timeout = value;
        }

        if let Ok(size) = std::env::var("WIRECALL_POOL_SIZE") {
            config.client.pool_size = size.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid WIRECALL_POOL_SIZE: {e}"))
            })?;
            config.client.threaded = true;
        }

        if let Ok(name) = std::env::var("WIRECALL_SERIALIZER") {
            config.serialization = SerializationFormat::from_name(&name).ok_or_else(|| {
                ProtocolError::ConfigError(format!("Unknown serializer: {name}"))
            })?;
        }

        if let Ok(password) = std::env::var("WIRECALL_PASSWORD") {
            let secret = std::env::var("WIRECALL_SECRET").unwrap_or_default();
            config.auth = Some(AuthConfig::new(password, secret));
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        if let Some(auth) = &self.auth {
            errors.extend(auth.validate());
        }
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address: `host:port` or `unix:/path/to/socket`
    pub address: String,

    /// Spawn one task per connection instead of serving inline
    pub threaded: bool,

    /// Deadline for each frame read/write while a call is in progress (0 = none)
    #[serde(with = "timeout_serde")]
    pub timeout: Option<Duration>,

    /// Deadline for an idle connection to send its next request (0 = none)
    #[serde(with = "timeout_serde")]
    pub idle_timeout: Option<Duration>,

    /// Log per-connection transport faults at error level instead of debug
    pub verbose: bool,

    /// Largest accepted frame payload
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            threaded: true,
            timeout: Some(timeout::DEFAULT_TIMEOUT),
            idle_timeout: None,
            verbose: false,
            max_frame_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if let Err(e) = Endpoint::parse(&self.address) {
            errors.push(format!("Invalid server address '{}': {e}", self.address));
        }

        if let Some(timeout) = self.timeout {
            if timeout.as_millis() < 10 {
                errors.push("Server timeout too short (minimum: 10ms)".to_string());
            }
        }

        if let Some(idle) = self.idle_timeout {
            if idle.as_millis() < 100 {
                errors.push("Idle timeout too short (minimum: 100ms)".to_string());
            }
        }

        errors.extend(validate_frame_size(self.max_frame_size));
        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target server address: `host:port` or `unix:/path/to/socket`
    pub address: String,

    /// Deadline for connecting and for each frame read/write (0 = none)
    #[serde(with = "timeout_serde")]
    pub timeout: Option<Duration>,

    /// Use a connection pool so calls can run concurrently
    pub threaded: bool,

    /// Initial pool size when `threaded` is set
    pub pool_size: usize,

    /// Delay between sweeps when shrinking the pool
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,

    /// Largest accepted frame payload
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            timeout: Some(timeout::DEFAULT_TIMEOUT),
            threaded: false,
            pool_size: 0,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_frame_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        } else if let Err(e) = Endpoint::parse(&self.address) {
            errors.push(format!("Invalid client address '{}': {e}", self.address));
        }

        if let Some(timeout) = self.timeout {
            if timeout.as_millis() < 10 {
                errors.push("Client timeout too short (minimum: 10ms)".to_string());
            }
        }

        if !self.threaded && self.pool_size > 0 {
            errors.push("pool_size is only used when threaded is enabled".to_string());
        }

        if self.pool_size > 1024 {
            errors.push(format!(
                "Pool size too large: {} (maximum: 1024)",
                self.pool_size
            ));
        }

        if self.sweep_interval.as_millis() < 1 {
            errors.push("Sweep interval too short (minimum: 1ms)".to_string());
        } else if self.sweep_interval.as_secs() > 10 {
            errors.push("Sweep interval too long (maximum: 10s)".to_string());
        }

        errors.extend(validate_frame_size(self.max_frame_size));
        errors
    }
}

fn validate_frame_size(size: usize) -> Vec<String> {
    let mut errors = Vec::new();
    if size < 1024 {
        errors.push("Max frame size too small (minimum: 1 KB)".to_string());
    } else if size > 100 * 1024 * 1024 {
        errors.push(format!(
            "Max frame size too large: {size} bytes (maximum recommended: 100 MB)"
        ));
    }
    errors
}

/// Password handshake settings, shared by both ends of a connection
#[derive(Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Password the client proves knowledge of
    pub password: String,

    /// Shared secret mixed with the salt to form the cipher key
    #[serde(default)]
    pub secret: String,

    /// Skip the server's success/failure acknowledgement
    #[serde(default)]
    pub fast_auth: bool,

    /// Number of random salt bytes the server sends
    #[serde(default = "default_salt_size")]
    pub salt_size: usize,
}

fn default_salt_size() -> usize {
    DEFAULT_SALT_SIZE
}

impl AuthConfig {
    pub fn new(password: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            secret: secret.into(),
            fast_auth: false,
            salt_size: DEFAULT_SALT_SIZE,
        }
    }

    pub fn with_fast_auth(mut self, fast_auth: bool) -> Self {
        self.fast_auth = fast_auth;
        self
    }

    pub fn with_salt_size(mut self, salt_size: usize) -> Self {
        self.salt_size = salt_size;
        self
    }

    /// Validate handshake settings
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.password.is_empty() {
            errors.push("Password cannot be empty when auth is configured".to_string());
        }

        if self.salt_size == 0 {
            errors.push("Salt size must be greater than 0".to_string());
        } else if self.salt_size + self.secret.len() > KEY_SIZE {
            errors.push(format!(
                "Salt size ({}) plus secret length ({}) exceeds the {KEY_SIZE}-byte key; \
                 the secret would be truncated",
                self.salt_size,
                self.secret.len()
            ));
        }

        errors
    }
}

// Keep credentials out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("password", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("fast_auth", &self.fast_auth)
            .field("salt_size", &self.salt_size)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("wirecall"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Optional timeouts as milliseconds, where 0 means "no deadline"
mod timeout_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(timeout: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = timeout.map_or(0, |d| d.as_millis() as u64);
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok((millis > 0).then(|| Duration::from_millis(millis)))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
