//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use serial_test::serial;
use std::time::Duration;
use tracing::Level;
use wirecall::config::{AuthConfig, ClientConfig, LoggingConfig, NetworkConfig, ServerConfig};
use wirecall::core::serialization::SerializationFormat;

#[test]
fn test_default_config_validates() {
    let config = NetworkConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_invalid_server_address() {
    let mut config = NetworkConfig::default();
    config.server.address = "invalid_address".to_string();

    let errors = config.validate();
    assert!(!errors.is_empty(), "Should have validation errors");
    assert!(errors.iter().any(|e| e.contains("Invalid server address")));
}

#[test]
fn test_empty_server_address() {
    let mut config = NetworkConfig::default();
    config.server.address = String::new();

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_unix_addresses_accepted() {
    let mut config = NetworkConfig::default();
    config.server.address = "unix:/tmp/wirecall.sock".to_string();
    config.client.address = "unix:/tmp/wirecall.sock".to_string();
    assert!(config.validate().is_empty());
}

#[test]
fn test_short_server_timeout() {
    let mut config = NetworkConfig::default();
    config.server.timeout = Some(Duration::from_millis(5));

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Server timeout too short")));
}

#[test]
fn test_no_timeout_is_valid() {
    let mut config = NetworkConfig::default();
    config.server.timeout = None;
    config.client.timeout = None;
    assert!(config.validate().is_empty());
}

#[test]
fn test_short_idle_timeout() {
    let mut config = NetworkConfig::default();
    config.server.idle_timeout = Some(Duration::from_millis(20));

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Idle timeout too short")));
}

#[test]
fn test_pool_size_requires_threaded() {
    let mut config = NetworkConfig::default();
    config.client.threaded = false;
    config.client.pool_size = 4;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("only used when threaded is enabled")));

    config.client.threaded = true;
    assert!(config.validate().is_empty());
}

#[test]
fn test_excessive_pool_size() {
    let mut config = NetworkConfig::default();
    config.client.threaded = true;
    config.client.pool_size = 5000;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Pool size too large")));
}

#[test]
fn test_sweep_interval_bounds() {
    let mut config = NetworkConfig::default();
    config.client.sweep_interval = Duration::from_secs(60);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Sweep interval too long")));

    config.client.sweep_interval = Duration::ZERO;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Sweep interval too short")));
}

#[test]
fn test_frame_size_bounds() {
    let mut config = NetworkConfig::default();
    config.server.max_frame_size = 512;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Max frame size too small")));

    config.server.max_frame_size = 200 * 1024 * 1024;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Max frame size too large")));
}

#[test]
fn test_auth_validation() {
    let mut config = NetworkConfig::default();

    config.auth = Some(AuthConfig::new("", "secret"));
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Password cannot be empty")));

    config.auth = Some(AuthConfig::new("pw", "secret").with_salt_size(0));
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Salt size must be greater than 0")));

    config.auth = Some(AuthConfig::new("pw", "a-very-long-shared-secret-value").with_salt_size(10));
    assert!(config.validate().iter().any(|e| e.contains("exceeds")));

    config.auth = Some(AuthConfig::new("pw", "secret"));
    assert!(config.validate().is_empty());
}

#[test]
fn test_auth_debug_redacts_credentials() {
    let auth = AuthConfig::new("hunter2", "shared-secret");
    let text = format!("{auth:?}");
    assert!(!text.contains("hunter2"));
    assert!(!text.contains("shared-secret"));
    assert!(text.contains("redacted"));
}

#[test]
fn test_logging_requires_output() {
    let mut config = NetworkConfig::default();
    config.logging.log_to_console = false;
    config.logging.log_to_file = false;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_log_file_path_required() {
    let mut config = NetworkConfig::default();
    config.logging.log_to_file = true;
    config.logging.log_file_path = None;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_validate_strict_collects_errors() {
    let mut config = NetworkConfig::default();
    config.server.address = String::new();
    config.client.pool_size = 3;

    let err = config.validate_strict().expect_err("config should be rejected");
    let message = err.to_string();
    assert!(message.contains("Configuration validation failed"));
    assert!(message.contains("cannot be empty"));
    assert!(message.contains("pool_size"));
}

#[test]
fn test_toml_roundtrip_through_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wirecall.toml");

    let config = NetworkConfig::default_with_overrides(|c| {
        c.serialization = SerializationFormat::MessagePack;
        c.client.threaded = true;
        c.client.pool_size = 4;
        c.client.timeout = Some(Duration::from_millis(1500));
        c.auth = Some(AuthConfig::new("pw", "secret").with_fast_auth(true));
        c.logging.log_level = Level::DEBUG;
    });
    config.save_to_file(&path).expect("save config");

    let loaded = NetworkConfig::from_file(&path).expect("load config");
    assert_eq!(loaded.serialization, SerializationFormat::MessagePack);
    assert!(loaded.client.threaded);
    assert_eq!(loaded.client.pool_size, 4);
    assert_eq!(loaded.client.timeout, Some(Duration::from_millis(1500)));
    let auth = loaded.auth.expect("auth section");
    assert!(auth.fast_auth);
    assert_eq!(auth.salt_size, 10);
    assert_eq!(loaded.logging.log_level, Level::DEBUG);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = NetworkConfig::from_toml(
        r#"
        serialization = "msgpack"

        [server]
        address = "0.0.0.0:7000"
        timeout = 0

        [auth]
        password = "pw"
        "#,
    )
    .expect("parse partial config");

    assert_eq!(config.serialization, SerializationFormat::MessagePack);
    assert_eq!(config.server.address, "0.0.0.0:7000");
    assert_eq!(config.server.timeout, None);
    assert!(config.server.threaded);
    assert_eq!(config.client.address, ClientConfig::default().address);
    let auth = config.auth.expect("auth");
    assert_eq!(auth.secret, "");
    assert!(!auth.fast_auth);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = NetworkConfig::from_toml("server = [").expect_err("should fail");
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_example_config_parses() {
    let text = NetworkConfig::example_config();
    let parsed = NetworkConfig::from_toml(&text).expect("example config parses");
    assert!(parsed.validate().is_empty());
}

#[test]
#[serial]
fn test_env_overrides() {
    std::env::set_var("WIRECALL_CLIENT_ADDRESS", "unix:/tmp/env.sock");
    std::env::set_var("WIRECALL_TIMEOUT_MS", "0");
    std::env::set_var("WIRECALL_POOL_SIZE", "3");
    std::env::set_var("WIRECALL_SERIALIZER", "json");
    std::env::set_var("WIRECALL_PASSWORD", "pw");
    std::env::set_var("WIRECALL_SECRET", "s");

    let config = NetworkConfig::from_env();

    for key in [
        "WIRECALL_CLIENT_ADDRESS",
        "WIRECALL_TIMEOUT_MS",
        "WIRECALL_POOL_SIZE",
        "WIRECALL_SERIALIZER",
        "WIRECALL_PASSWORD",
        "WIRECALL_SECRET",
    ] {
        std::env::remove_var(key);
    }

    let config = config.expect("env config");
    assert_eq!(config.client.address, "unix:/tmp/env.sock");
    assert_eq!(config.client.timeout, None);
    assert_eq!(config.server.timeout, None);
    assert!(config.client.threaded);
    assert_eq!(config.client.pool_size, 3);
    assert_eq!(config.serialization, SerializationFormat::Json);
    let auth = config.auth.expect("auth from env");
    assert_eq!(auth.password, "pw");
    assert_eq!(auth.secret, "s");
}

#[test]
#[serial]
fn test_env_rejects_bad_numbers() {
    std::env::set_var("WIRECALL_POOL_SIZE", "many");
    let result = NetworkConfig::from_env();
    std::env::remove_var("WIRECALL_POOL_SIZE");
    assert!(result.is_err());
}

#[test]
fn test_component_defaults() {
    let server = ServerConfig::default();
    assert!(server.threaded);
    assert_eq!(server.timeout, Some(Duration::from_secs(30)));
    assert!(!server.verbose);

    let client = ClientConfig::default();
    assert!(!client.threaded);
    assert_eq!(client.pool_size, 0);
    assert_eq!(client.sweep_interval, Duration::from_millis(50));

    let logging = LoggingConfig::default();
    assert_eq!(logging.app_name, "wirecall");
    assert_eq!(logging.log_level, Level::INFO);
}
