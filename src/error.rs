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

// Error taxonomy for the delivery pipeline

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the record store, checkpoint store, uploader and coordinator.
///
/// Everything except [`PipelineError::Liveness`] is contained by the task that
/// hit it and retried on the next scheduled cycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Open/seek/append/read failure on a record log.
    #[error("storage error on stream '{stream}': {source}")]
    Storage {
        stream: String,
        #[source]
        source: std::io::Error,
    },

    /// Persisting a checkpoint failed after the batch was confirmed delivered.
    #[error("checkpoint write failed for slot {slot}: {source}")]
    CheckpointWrite {
        slot: usize,
        #[source]
        source: std::io::Error,
    },

    /// Every delivery attempt for a batch failed.
    #[error("delivery failed on stream '{stream}' after {attempts} attempts: {reason}")]
    Delivery {
        stream: String,
        attempts: u32,
        reason: String,
    },

    /// Resume marker does not fit the fixed-width checkpoint slot.
    #[error("resume marker of {len} bytes exceeds slot width of {max} bytes")]
    InvalidMarker { len: usize, max: usize },

    /// A task stopped completing cycles within its liveness window.
    #[error("task '{task}' missed its liveness window (silent for {silent_for:?})")]
    Liveness { task: String, silent_for: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn storage(stream: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Storage {
            stream: stream.into(),
            source,
        }
    }

    /// Only liveness faults warrant a process restart.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Liveness { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
