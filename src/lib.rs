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

// Telemetry relay for field devices
//
// Samples position, probe registers and the clock, keeps every record in an
// append-only local log, and delivers the logs to a remote API at least once:
// - Live snapshots pushed best effort
// - Durable per-stream checkpoints that survive restarts
// - Bounded batches with bounded retries
// - Task liveness supervision

pub mod config;
pub mod coordinator;
pub mod error;
pub mod liveness;
pub mod protocol;
pub mod retry;
pub mod sensors;
pub mod signal;
pub mod storage;
pub mod tasks;
pub mod transport;
pub mod uploader;
pub mod validator;

// Re-export main types
pub use config::{load_config, load_config_with_env, RelayConfig};
pub use coordinator::{run_task, supervise, Collaborators, Coordinator, Schedule};
pub use error::{PipelineError, Result};
pub use liveness::{Heartbeat, LivenessMonitor};
pub use protocol::{
    Channel, ErrorRecord, Location, ProbeReading, ReadingRecord, Record, Stream, StreamKind,
};
pub use retry::{Delivery, RetryPolicy};
pub use signal::{Wake, WakeSignal};
pub use storage::{Checkpoint, CheckpointStore, RecordStore, ScanOutcome};
pub use tasks::{ErrorLog, PeriodicTask};
pub use transport::{Transport, TransportFactory};
pub use uploader::{BatchUploader, UploadReport};
