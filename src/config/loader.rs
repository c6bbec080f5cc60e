// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;
use std::time::Duration;

/// Largest batch the uploader may assemble
pub const MAX_BATCH_SIZE: usize = 5;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RelayConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        Self::load_str(&content)
    }

    /// Parse and validate configuration text
    pub fn load_str(content: &str) -> Result<RelayConfig> {
        let content = Self::substitute_env_vars(content)?;

        let config: RelayConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${DEVICE_ID:-relay-001} -> relay-001 (if DEVICE_ID not set)
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}")
            .context("Invalid substitution pattern")?;

        Ok(re
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default_value = caps.get(2).map(|m| m.as_str());

                match std::env::var(var_name) {
                    Ok(value) => value,
                    Err(_) => match default_value {
                        Some(default) => default.to_string(),
                        // Keep original if no default and var not found
                        None => format!("${{{}}}", var_name),
                    },
                }
            })
            .to_string())
    }

    /// Validate configuration
    pub fn validate(config: &RelayConfig) -> Result<()> {
        if config.device.device_id.is_empty() {
            bail!("device.device_id cannot be empty");
        }

        if config.upload.batch_size == 0 || config.upload.batch_size > MAX_BATCH_SIZE {
            bail!("upload.batch_size must be between 1 and {}", MAX_BATCH_SIZE);
        }

        if config.upload.max_attempts == 0 {
            bail!("upload.max_attempts must be > 0");
        }

        if config.upload.sweep_threshold == 0 {
            bail!("upload.sweep_threshold must be > 0");
        }

        if config.probes.ids.is_empty() {
            bail!("probes.ids must list at least one probe");
        }

        if config.storage.data_dir.is_empty() {
            bail!("storage.data_dir cannot be empty");
        }

        let window = config.liveness.window();
        if config.upload.retry_backoff() >= window {
            bail!("upload.retry_backoff_ms must be shorter than liveness.window_seconds");
        }

        match config.transport.backend.as_str() {
            "http" => match config.transport.backend_config.as_http() {
                None => bail!("http transport selected but http config missing"),
                Some(http) => {
                    let timeout = Duration::from_secs(http.timeout_seconds);
                    if timeout >= window {
                        bail!("transport.http.timeout_seconds must be shorter than liveness.window_seconds");
                    }
                    // Push may block on a reconnect and then a send between heartbeats
                    let push_gap = config.tasks.push_gap() + timeout * 2;
                    if push_gap >= window {
                        bail!(
                            "push worst case ({:?}: two http timeouts plus push delay and wake timeout) must fit inside liveness.window_seconds ({}s)",
                            push_gap,
                            config.liveness.window_seconds
                        );
                    }
                    if timeout + config.upload.retry_backoff() >= window {
                        bail!("transport.http.timeout_seconds plus upload.retry_backoff_ms must be shorter than liveness.window_seconds");
                    }
                }
            },
            "filesystem" => {
                if config.transport.backend_config.as_filesystem().is_none() {
                    bail!("filesystem transport selected but filesystem config missing");
                }
            }
            unknown => bail!("Unknown transport: '{}'. Supported: http, filesystem", unknown),
        }

        let liveness = &config.liveness;
        if liveness.check_interval_seconds == 0 {
            bail!("liveness.check_interval_seconds must be > 0");
        }
        if liveness.check_interval_seconds >= liveness.window_seconds {
            bail!("liveness.check_interval_seconds must be shorter than liveness.window_seconds");
        }
        if config.tasks.longest_cycle_gap() >= liveness.window() {
            bail!(
                "task delays ({:?} worst case) must fit inside liveness.window_seconds ({}s)",
                config.tasks.longest_cycle_gap(),
                liveness.window_seconds
            );
        }

        Ok(())
    }
}
