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

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use telemetry_relay::config::{load_config_with_env, ConfigLoader, LoggingConfig};
use telemetry_relay::coordinator::{Collaborators, Coordinator};
use telemetry_relay::sensors::{LogStatus, SimulatedRegisters, StaticPosition, SystemClock};
use telemetry_relay::transport::TransportFactory;

/// Telemetry Relay - Log device telemetry locally and deliver it upstream
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Device ID (overrides config file)
    #[arg(short, long)]
    device_id: Option<String>,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config_with_env(&args.config)?;

    if let Some(device_id) = args.device_id {
        config.device.device_id = device_id;
        ConfigLoader::validate(&config)?;
    }

    init_tracing(&config.logging)?;

    info!("Starting Telemetry Relay");
    info!("Loaded configuration from: {:?}", args.config);
    info!("Device ID: {}", config.device.device_id);
    info!("Transport: {}", config.transport.backend);
    info!("Probes: {:?}", config.probes.ids);

    let transport = TransportFactory::create(&config.transport)?;

    let collaborators = Collaborators {
        transport,
        position: Box::new(StaticPosition::new(&config.sensors.position)),
        registers: Box::new(SimulatedRegisters::default()),
        clock: Arc::new(SystemClock),
        status: Arc::new(LogStatus),
    };
    let coordinator = Coordinator::new(config, collaborators);

    // The coordinator only returns on a fault
    tokio::select! {
        result = coordinator.run() => {
            if let Err(e) = result {
                if e.is_fatal() {
                    error!("Relay stalled, exiting for restart: {}", e);
                } else {
                    error!("Relay failed to start: {}", e);
                }
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    info!("Telemetry Relay shut down successfully");
    Ok(())
}
