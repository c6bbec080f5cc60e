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

// Task heartbeats and the liveness monitor that watches them

use crate::error::PipelineError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Handle a task uses to report a completed cycle
#[derive(Clone)]
pub struct Heartbeat {
    epoch: Instant,
    last_beat_ms: Arc<AtomicU64>,
}

impl Heartbeat {
    pub fn beat(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_beat_ms.store(now, Ordering::Release);
    }
}

/// Tracks the last completed cycle of every registered task
pub struct LivenessMonitor {
    epoch: Instant,
    window: Duration,
    beats: DashMap<String, Arc<AtomicU64>>,
}

impl LivenessMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            window,
            beats: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register a task; it counts as alive from this moment.
    pub fn register(&self, task: &str) -> Heartbeat {
        let last_beat_ms = Arc::new(AtomicU64::new(self.epoch.elapsed().as_millis() as u64));
        self.beats.insert(task.to_string(), last_beat_ms.clone());
        Heartbeat {
            epoch: self.epoch,
            last_beat_ms,
        }
    }

    /// Fail with the most silent task if any exceeded the window.
    pub fn check(&self) -> Result<(), PipelineError> {
        let now = self.epoch.elapsed().as_millis() as u64;
        let stalest = self
            .beats
            .iter()
            .map(|entry| {
                let silent = now.saturating_sub(entry.value().load(Ordering::Acquire));
                (entry.key().clone(), Duration::from_millis(silent))
            })
            .max_by_key(|(_, silent)| *silent);

        match stalest {
            Some((task, silent_for)) if silent_for > self.window => {
                Err(PipelineError::Liveness { task, silent_for })
            }
            Some((task, silent_for)) => {
                debug!(stalest = %task, silent_ms = silent_for.as_millis() as u64, "All tasks live");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_beating_task_stays_live() {
        let monitor = LivenessMonitor::new(Duration::from_secs(60));
        let heartbeat = monitor.register("position");

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(30)).await;
            heartbeat.beat();
            assert!(monitor.check().is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_task_is_fatal() {
        let monitor = LivenessMonitor::new(Duration::from_secs(60));
        let live = monitor.register("clock");
        let _stalled = monitor.register("sweep");

        tokio::time::advance(Duration::from_secs(61)).await;
        live.beat();

        match monitor.check() {
            Err(PipelineError::Liveness { task, silent_for }) => {
                assert_eq!(task, "sweep");
                assert!(silent_for > Duration::from_secs(60));
            }
            other => panic!("expected liveness fault, got {:?}", other),
        }
    }
}
