// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration types for telemetry-relay

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RelayConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    pub transport: TransportConfig,
    pub probes: ProbeConfig,
    #[serde(default)]
    pub sensors: SensorConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub device_id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: "relay-001".to_string(),
        }
    }
}

/// Local durable storage for record logs and checkpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Checkpoint file name, relative to `data_dir`
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            checkpoint_file: default_checkpoint_file(),
        }
    }
}

impl StorageConfig {
    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.checkpoint_file)
    }
}

/// Batch upload policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between delivery attempts; 0 retries immediately
    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Appends to accumulate before the API sweep runs
    #[serde(default = "default_sweep_threshold")]
    pub sweep_threshold: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: 0,
            sweep_threshold: default_sweep_threshold(),
        }
    }
}

impl UploadConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Transport configuration with backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Backend type: "http" or "filesystem"
    pub backend: String,

    /// Backend-specific configuration
    #[serde(flatten)]
    pub backend_config: BackendConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: "http".to_string(),
            backend_config: BackendConfig::Http {
                http: HttpConfig::default(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BackendConfig {
    Http {
        #[serde(rename = "http")]
        http: HttpConfig,
    },
    Filesystem {
        #[serde(rename = "filesystem")]
        filesystem: FilesystemConfig,
    },
}

impl BackendConfig {
    pub fn as_http(&self) -> Option<&HttpConfig> {
        match self {
            BackendConfig::Http { http } => Some(http),
            _ => None,
        }
    }

    pub fn as_http_mut(&mut self) -> Option<&mut HttpConfig> {
        match self {
            BackendConfig::Http { http } => Some(http),
            _ => None,
        }
    }

    pub fn as_filesystem(&self) -> Option<&FilesystemConfig> {
        match self {
            BackendConfig::Filesystem { filesystem } => Some(filesystem),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Base URL of the pull-style API
    pub api_url: String,

    /// Endpoint receiving live snapshots
    pub push_url: String,

    #[serde(default = "default_errors_path")]
    pub errors_path: String,

    #[serde(default = "default_readings_path")]
    pub readings_path: String,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            push_url: "http://localhost:8080/api/v1/live".to_string(),
            errors_path: default_errors_path(),
            readings_path: default_readings_path(),
            health_path: default_health_path(),
            api_token: None,
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesystemConfig {
    pub spool_dir: String,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            spool_dir: "/var/spool/telemetry-relay".to_string(),
        }
    }
}

/// Probes polled over the register bus
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    pub ids: Vec<u8>,
    #[serde(default)]
    pub registers: RegisterMap,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ids: vec![1],
            registers: RegisterMap::default(),
        }
    }
}

/// Holding register address of each probe field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegisterMap {
    pub volume: u16,
    pub ullage: u16,
    pub temperature: u16,
    pub product: u16,
    pub water: u16,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            volume: 0,
            ullage: 2,
            temperature: 4,
            product: 6,
            water: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SensorConfig {
    /// Fix reported by the static position source
    #[serde(default)]
    pub position: StaticPositionConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StaticPositionConfig {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

/// Minimum inter-iteration delays of the periodic tasks
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskConfig {
    #[serde(default = "default_fast_delay")]
    pub position_delay_ms: u64,
    #[serde(default = "default_registers_delay")]
    pub registers_delay_ms: u64,
    #[serde(default = "default_fast_delay")]
    pub clock_delay_ms: u64,
    #[serde(default = "default_fast_delay")]
    pub push_delay_ms: u64,
    #[serde(default = "default_fast_delay")]
    pub local_log_delay_ms: u64,
    #[serde(default = "default_fast_delay")]
    pub sweep_delay_ms: u64,

    /// Fallback wait of consumers when no wake signal arrives
    #[serde(default = "default_wake_timeout")]
    pub wake_timeout_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            position_delay_ms: default_fast_delay(),
            registers_delay_ms: default_registers_delay(),
            clock_delay_ms: default_fast_delay(),
            push_delay_ms: default_fast_delay(),
            local_log_delay_ms: default_fast_delay(),
            sweep_delay_ms: default_fast_delay(),
            wake_timeout_ms: default_wake_timeout(),
        }
    }
}

impl TaskConfig {
    pub fn wake_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_timeout_ms)
    }

    /// Idle time of the push task between two cycles, before any I/O.
    pub fn push_gap(&self) -> Duration {
        Duration::from_millis(self.push_delay_ms + self.wake_timeout_ms)
    }

    /// Longest time any task may go between two completed cycles.
    pub fn longest_cycle_gap(&self) -> Duration {
        let producers = self
            .position_delay_ms
            .max(self.registers_delay_ms)
            .max(self.clock_delay_ms)
            .max(self.sweep_delay_ms);
        let consumers = self.push_delay_ms.max(self.local_log_delay_ms) + self.wake_timeout_ms;
        Duration::from_millis(producers.max(consumers))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LivenessConfig {
    #[serde(default = "default_liveness_window")]
    pub window_seconds: u64,
    #[serde(default = "default_liveness_check")]
    pub check_interval_seconds: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_liveness_window(),
            check_interval_seconds: default_liveness_check(),
        }
    }
}

impl LivenessConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_data_dir() -> String { "/var/lib/telemetry-relay".to_string() }
fn default_checkpoint_file() -> String { "checkpoints.bin".to_string() }
fn default_batch_size() -> usize { 5 }
fn default_max_attempts() -> u32 { 5 }
fn default_sweep_threshold() -> usize { 5 }
fn default_errors_path() -> String { "/api/v1/errors".to_string() }
fn default_readings_path() -> String { "/api/v1/readings".to_string() }
fn default_health_path() -> String { "/api/v1/health".to_string() }
fn default_timeout() -> u64 { 10 }
fn default_fast_delay() -> u64 { 5000 }
fn default_registers_delay() -> u64 { 10000 }
fn default_wake_timeout() -> u64 { 30000 }
fn default_liveness_window() -> u64 { 60 }
fn default_liveness_check() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
