// Configuration module for telemetry-relay
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::{ConfigLoader, MAX_BATCH_SIZE};

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RelayConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<RelayConfig> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Allow environment variables to override config values
pub fn apply_env_overrides(config: &mut RelayConfig) {
    if let Ok(device_id) = std::env::var("DEVICE_ID") {
        config.device.device_id = device_id;
    }

    if let Ok(api_url) = std::env::var("API_URL") {
        if let Some(http) = config.transport.backend_config.as_http_mut() {
            http.api_url = api_url;
        }
    }

    if let Ok(api_token) = std::env::var("API_TOKEN") {
        if let Some(http) = config.transport.backend_config.as_http_mut() {
            http.api_token = Some(api_token);
        }
    }
}
