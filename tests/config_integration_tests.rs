// Configuration system integration tests

use std::fs;
use tempfile::TempDir;
use telemetry_relay::config::{load_config, ConfigLoader, RelayConfig};
use telemetry_relay::transport::TransportFactory;

const MINIMAL: &str = r#"
device:
  device_id: ${RELAY_IT_DEVICE:-relay-it}

transport:
  backend: filesystem
  filesystem:
    spool_dir: ${RELAY_IT_SPOOL:-/tmp/relay-it-spool}

probes:
  ids: [3, 5]
"#;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("relay.yaml");
    fs::write(&path, content).expect("Failed to write temp config");
    path
}

#[test]
fn test_load_default_config() {
    let result = load_config("config/default.yaml");
    assert!(result.is_ok(), "Failed to load default config: {:?}", result.err());

    let config = result.unwrap();

    assert_eq!(config.transport.backend, "http");
    assert_eq!(config.probes.ids, vec![1, 2, 3]);
    assert_eq!(config.upload.batch_size, 5);
    assert_eq!(config.upload.max_attempts, 5);
    assert_eq!(config.tasks.wake_timeout_ms, 30_000);
    assert_eq!(config.liveness.window_seconds, 60);
    assert_eq!(config.logging.level, "info");
    assert!(config.transport.backend_config.as_http().is_some());
}

#[test]
fn test_minimal_config_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, MINIMAL);

    let config = load_config(&path).unwrap();

    assert_eq!(config.device.device_id, "relay-it");
    assert_eq!(config.probes.ids, vec![3, 5]);
    assert_eq!(config.probes.registers.temperature, 4);
    assert_eq!(config.upload.sweep_threshold, 5);
    assert_eq!(config.tasks.registers_delay_ms, 10_000);
    assert_eq!(
        config.transport.backend_config.as_filesystem().unwrap().spool_dir,
        "/tmp/relay-it-spool"
    );
}

#[test]
fn test_config_with_env_vars() {
    let dir = TempDir::new().unwrap();
    // Own variable name so parallel tests keep seeing the default
    let path = write_config(&dir, &MINIMAL.replace("RELAY_IT_SPOOL", "RELAY_IT_ENV_SPOOL"));

    std::env::set_var("RELAY_IT_ENV_SPOOL", "/srv/spool");
    let result = load_config(&path);
    std::env::remove_var("RELAY_IT_ENV_SPOOL");

    let config = result.unwrap();
    assert_eq!(
        config.transport.backend_config.as_filesystem().unwrap().spool_dir,
        "/srv/spool"
    );
}

#[test]
fn test_config_validation() {
    let dir = TempDir::new().unwrap();
    let invalid = format!("{}\nupload:\n  batch_size: 12\n", MINIMAL);
    let path = write_config(&dir, &invalid);

    let result = load_config(&path);
    assert!(result.is_err(), "Expected validation error for invalid config");
    assert!(format!("{:#}", result.unwrap_err()).contains("batch_size"));
}

#[test]
fn test_unknown_transport_rejected() {
    let mut config = RelayConfig::default();
    config.transport.backend = "mqtt".to_string();

    let result = ConfigLoader::validate(&config);
    assert!(result.unwrap_err().to_string().contains("mqtt"));
}

#[test]
fn test_transport_factory_from_loaded_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, MINIMAL);
    let config = load_config(&path).unwrap();

    let transport = TransportFactory::create(&config.transport).unwrap();
    assert_eq!(transport.transport_type(), "filesystem");
}

#[test]
fn test_config_defaults() {
    let config = RelayConfig::default();

    assert_eq!(config.device.device_id, "relay-001");
    assert_eq!(config.transport.backend, "http");
    assert_eq!(config.upload.batch_size, 5);
    assert_eq!(config.upload.retry_backoff_ms, 0);
    assert_eq!(config.tasks.position_delay_ms, 5_000);
    assert_eq!(config.liveness.check_interval_seconds, 10);
    assert_eq!(config.logging.format, "text");
}
