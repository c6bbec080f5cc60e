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

// Task scheduling, wiring and supervision

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, RelayConfig};
use crate::error::PipelineError;
use crate::liveness::{Heartbeat, LivenessMonitor};
use crate::protocol::Stream;
use crate::retry::RetryPolicy;
use crate::sensors::{Clock, PositionSource, RegisterSource, StatusSink};
use crate::signal::{Wake, WakeSignal};
use crate::storage::{CheckpointStore, RecordStore};
use crate::tasks::{
    ClockTask, ErrorLog, LocalLogTask, PeriodicTask, PositionTask, PushTask, RegisterTask,
    SnapshotFeed, SweepTask,
};
use crate::transport::Transport;
use crate::uploader::BatchUploader;

/// Error events buffered between two local log cycles
pub const ERROR_QUEUE_CAPACITY: usize = 64;

/// When a task runs its next cycle
#[derive(Clone, Default)]
pub struct Schedule {
    /// Pause after every cycle
    pub min_delay: Duration,
    /// Signal to wait on after the pause, with the longest wait
    pub wake: Option<(Arc<WakeSignal>, Duration)>,
    /// Consumers to wake after every cycle
    pub notify: Vec<Arc<WakeSignal>>,
}

impl Schedule {
    pub fn every(min_delay: Duration) -> Self {
        Self {
            min_delay,
            ..Self::default()
        }
    }

    pub fn notifying(mut self, signals: &[Arc<WakeSignal>]) -> Self {
        self.notify.extend(signals.iter().cloned());
        self
    }

    pub fn woken_by(mut self, signal: Arc<WakeSignal>, timeout: Duration) -> Self {
        self.wake = Some((signal, timeout));
        self
    }
}

/// Drive `task` forever: one cycle, heartbeat, notify, pause, then wait for a
/// wake or its timeout.
pub async fn run_task(mut task: Box<dyn PeriodicTask>, schedule: Schedule, heartbeat: Heartbeat) {
    let name = task.name();
    info!(task = name, "Task started");

    loop {
        if let Err(e) = task.run_cycle().await {
            warn!(task = name, "Cycle failed: {:#}", e);
        }
        heartbeat.beat();

        for signal in &schedule.notify {
            signal.send();
        }

        sleep(schedule.min_delay).await;

        if let Some((signal, timeout)) = &schedule.wake {
            if signal.wait(*timeout).await == Wake::TimedOut {
                debug!(task = name, "No wake signal, running on timeout");
            }
        }
    }
}

/// Check liveness every `check_interval` and return the first fault.
pub async fn supervise(monitor: &LivenessMonitor, check_interval: Duration) -> PipelineError {
    let mut ticker = tokio::time::interval(check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(fault) = monitor.check() {
            return fault;
        }
    }
}

/// Hardware and network the coordinator drives
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub position: Box<dyn PositionSource>,
    pub registers: Box<dyn RegisterSource>,
    pub clock: Arc<dyn Clock>,
    pub status: Arc<dyn StatusSink>,
}

pub struct Coordinator {
    config: RelayConfig,
    collaborators: Collaborators,
}

impl Coordinator {
    pub fn new(config: RelayConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// Start every task and supervise them.
    ///
    /// Only returns on a fault: an invalid configuration, a failed store
    /// initialisation or a task that stopped completing cycles. All tasks are
    /// aborted before returning.
    pub async fn run(self) -> Result<(), PipelineError> {
        let Self {
            config,
            collaborators,
        } = self;
        let Collaborators {
            transport,
            position,
            registers,
            clock,
            status,
        } = collaborators;

        ConfigLoader::validate(&config).map_err(|e| PipelineError::Config(format!("{:#}", e)))?;

        let records = Arc::new(RecordStore::new(&config.storage.data_dir));
        records.initialize().await?;
        let checkpoints = Arc::new(CheckpointStore::new(config.storage.checkpoint_path()));

        let streams = Stream::all(&config.probes.ids);
        let monitor = LivenessMonitor::new(config.liveness.window());
        let errors = ErrorLog::new(ERROR_QUEUE_CAPACITY, clock.clone());
        let feed = SnapshotFeed::new(config.probes.ids.len());
        let push_view = feed.subscribe();
        let log_view = feed.subscribe();
        let SnapshotFeed {
            location,
            probes,
            timestamp,
        } = feed;

        let push_wake = Arc::new(WakeSignal::new());
        let log_wake = Arc::new(WakeSignal::new());
        let consumers = [push_wake.clone(), log_wake.clone()];
        let (appended_tx, appended_rx) = mpsc::unbounded_channel();

        let tasks = &config.tasks;
        let wake_timeout = tasks.wake_timeout();
        let delay = Duration::from_millis;

        info!(
            device = %config.device.device_id,
            streams = streams.len(),
            transport = transport.transport_type(),
            "Starting telemetry relay"
        );

        let mut set = JoinSet::new();
        let mut spawn = |task: Box<dyn PeriodicTask>, schedule: Schedule, heartbeat: Heartbeat| {
            set.spawn(run_task(task, schedule, heartbeat));
        };

        spawn(
            Box::new(PositionTask::new(position, errors.clone(), location)),
            Schedule::every(delay(tasks.position_delay_ms)).notifying(&consumers),
            monitor.register("position"),
        );
        spawn(
            Box::new(RegisterTask::new(
                registers,
                config.probes.ids.clone(),
                config.probes.registers,
                errors.clone(),
                probes,
            )),
            Schedule::every(delay(tasks.registers_delay_ms)).notifying(&consumers),
            monitor.register("registers"),
        );
        spawn(
            Box::new(ClockTask::new(
                clock,
                errors.clone(),
                status.clone(),
                timestamp,
            )),
            Schedule::every(delay(tasks.clock_delay_ms)).notifying(&consumers),
            monitor.register("clock"),
        );
        spawn(
            Box::new(PushTask::new(
                transport.clone(),
                config.device.device_id.clone(),
                config.probes.ids.clone(),
                push_view,
                status.clone(),
                errors.clone(),
            )),
            Schedule::every(delay(tasks.push_delay_ms)).woken_by(push_wake, wake_timeout),
            monitor.register("push"),
        );
        spawn(
            Box::new(LocalLogTask::new(
                records.clone(),
                &streams,
                errors.clone(),
                log_view,
                appended_tx,
            )),
            Schedule::every(delay(tasks.local_log_delay_ms)).woken_by(log_wake, wake_timeout),
            monitor.register("local-log"),
        );

        let sweep_heartbeat = monitor.register("sweep");
        let uploader = BatchUploader::new(
            records,
            checkpoints,
            transport.clone(),
            config.device.device_id.clone(),
        )
        .with_batch_size(config.upload.batch_size)
        .with_policy(RetryPolicy::new(
            config.upload.max_attempts,
            config.upload.retry_backoff(),
        ))
        .with_heartbeat(sweep_heartbeat.clone());
        spawn(
            Box::new(SweepTask::new(
                uploader,
                transport,
                streams,
                status,
                errors,
                appended_rx,
                config.upload.sweep_threshold,
            )),
            Schedule::every(delay(tasks.sweep_delay_ms)),
            sweep_heartbeat,
        );

        let fault = supervise(&monitor, config.liveness.check_interval()).await;
        error!("{}", fault);
        set.abort_all();
        Err(fault)
    }
}
