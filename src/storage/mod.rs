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

// Local durable storage
//
// - records: per-stream append-only record logs
// - checkpoint: per-stream delivery checkpoints in fixed slots
// - scanner: locate the resume point of a stream from its checkpoint

pub mod checkpoint;
pub mod records;
pub mod scanner;

pub use checkpoint::{Checkpoint, CheckpointSlot, CheckpointStore};
pub use records::{RawLine, RecordReader, RecordStore};
pub use scanner::{locate, ScanOutcome};
