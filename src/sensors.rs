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

// Interfaces to the device's external collaborators, plus the stand-ins used
// for bench runs where no receiver, register bus or display is attached.

use crate::config::StaticPositionConfig;
use crate::protocol::{Location, TIMESTAMP_FORMAT};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDateTime};
use tracing::info;

/// Result of polling the positioning receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Updated,
    NoResponse,
    Invalid,
}

#[async_trait]
pub trait PositionSource: Send {
    async fn update(&mut self) -> PositionStatus;

    /// Last known fix
    fn location(&self) -> Location;
}

#[async_trait]
pub trait RegisterSource: Send {
    /// Read one holding register of a probe as a float
    async fn read(&mut self, probe_id: u8, register: u16) -> Result<f64>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn is_valid(&self) -> bool;

    fn timestamp(&self) -> String {
        self.now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Status rows of the device display
pub mod rows {
    pub const API: u8 = 0;
    pub const NETWORK: u8 = 1;
    pub const PUSH: u8 = 2;
    pub const CLOCK: u8 = 3;
}

pub trait StatusSink: Send + Sync {
    fn print(&self, row: u8, text: &str);
}

/// Position source reporting a fixed, configured location
pub struct StaticPosition {
    location: Location,
}

impl StaticPosition {
    pub fn new(config: &StaticPositionConfig) -> Self {
        Self {
            location: Location {
                latitude: config.latitude,
                longitude: config.longitude,
                speed: 0.0,
                altitude: config.altitude,
            },
        }
    }
}

#[async_trait]
impl PositionSource for StaticPosition {
    async fn update(&mut self) -> PositionStatus {
        PositionStatus::Updated
    }

    fn location(&self) -> Location {
        self.location
    }
}

/// Deterministic register values that drift a little on every read
#[derive(Default)]
pub struct SimulatedRegisters {
    reads: u64,
}

#[async_trait]
impl RegisterSource for SimulatedRegisters {
    async fn read(&mut self, probe_id: u8, register: u16) -> Result<f64> {
        self.reads += 1;
        let base = f64::from(probe_id) * 100.0 + f64::from(register) * 10.0;
        Ok(base + (self.reads % 50) as f64 / 10.0)
    }
}

/// Host clock; valid once it has been set past the firmware epoch
pub struct SystemClock;

const MIN_VALID_YEAR: i32 = 2024;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn is_valid(&self) -> bool {
        self.now().year() >= MIN_VALID_YEAR
    }
}

/// Status sink that writes display rows to the log
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn print(&self, row: u8, text: &str) {
        info!(row, "{}", text);
    }
}
