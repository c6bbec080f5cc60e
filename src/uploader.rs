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

//! Resumable batch uploader
//!
//! Reads a stream from its checkpoint, groups valid records into bounded
//! batches, delivers each batch under a [`RetryPolicy`], and only then moves
//! the stream's checkpoint to the batch's last record.
//!
//! # Delivery guarantee
//!
//! At least once. Batches go out contiguously and in file order. A crash
//! between the remote acknowledgment and the checkpoint write redelivers that
//! batch on the next cycle.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::liveness::Heartbeat;
use crate::protocol::{encode_batch, Record, Stream};
use crate::retry::{Delivery, RetryPolicy};
use crate::storage::{locate, Checkpoint, CheckpointStore, RecordStore, ScanOutcome};
use crate::transport::Transport;
use crate::validator;

/// What one upload cycle did for a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Batches delivered and checkpointed
    pub batches: usize,
    /// Records in those batches
    pub records: usize,
    /// Blank, corrupted or undecodable lines passed over
    pub skipped_lines: usize,
    /// Whether a resume point was found at all
    pub resumed: bool,
    /// Lines exist past the checkpoint but the anchor record is gone
    pub anchor_missing: bool,
}

pub struct BatchUploader {
    records: Arc<RecordStore>,
    checkpoints: Arc<CheckpointStore>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    batch_size: usize,
    device_id: String,
    heartbeat: Option<Heartbeat>,
}

impl BatchUploader {
    pub fn new(
        records: Arc<RecordStore>,
        checkpoints: Arc<CheckpointStore>,
        transport: Arc<dyn Transport>,
        device_id: String,
    ) -> Self {
        Self {
            records,
            checkpoints,
            transport,
            policy: RetryPolicy::default(),
            batch_size: 5,
            device_id,
            heartbeat: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Report progress after every batch so a long backlog does not look
    /// like a stalled task.
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    /// Deliver everything appended to `stream` since its checkpoint.
    ///
    /// A missing log or an unlocatable resume point is not an error: there is
    /// simply nothing to do yet. A batch that exhausts its attempts aborts the
    /// cycle with [`PipelineError::Delivery`] and leaves the checkpoint where it
    /// was.
    pub async fn upload_stream(&self, stream: &Stream) -> Result<UploadReport> {
        let mut report = UploadReport::default();

        let Some(mut reader) = self.records.open_for_read(stream).await? else {
            debug!(stream = %stream, "No record log yet");
            return Ok(report);
        };

        let checkpoint = self.checkpoints.load(stream).await?;
        match locate(&mut reader, &checkpoint).await? {
            ScanOutcome::Positioned => {}
            ScanOutcome::NotFound => return Ok(report),
            ScanOutcome::AnchorMissing => {
                report.anchor_missing = true;
                return Ok(report);
            }
        }
        report.resumed = true;

        let mut exhausted = false;
        while !exhausted {
            let mut batch: Vec<Record> = Vec::with_capacity(self.batch_size);
            let mut anchor = 0;

            while batch.len() < self.batch_size {
                let Some(raw) = reader.read_line().await? else {
                    exhausted = true;
                    break;
                };
                match validator::accept(&raw.text).and_then(|line| Record::decode(stream.kind(), line)) {
                    Some(record) => {
                        anchor = raw.offset;
                        batch.push(record);
                    }
                    None => {
                        report.skipped_lines += 1;
                        debug!(stream = %stream, offset = raw.offset, "Skipping invalid line");
                    }
                }
            }

            let Some(last) = batch.last() else {
                break;
            };

            self.deliver(stream, &batch).await?;

            let next = Checkpoint::after_record(last.timestamp(), anchor);
            if let Err(e) = self.checkpoints.save(stream, &next).await {
                warn!(
                    stream = %stream,
                    "Batch delivered but checkpoint not persisted; it will be redelivered: {}",
                    e
                );
                return Err(e);
            }

            report.batches += 1;
            report.records += batch.len();
            if let Some(heartbeat) = &self.heartbeat {
                heartbeat.beat();
            }
        }

        if report.batches > 0 {
            info!(
                stream = %stream,
                batches = report.batches,
                records = report.records,
                skipped = report.skipped_lines,
                "Upload cycle complete"
            );
        }
        Ok(report)
    }

    async fn deliver(&self, stream: &Stream, batch: &[Record]) -> Result<()> {
        let payload = encode_batch(&self.device_id, stream, batch)
            .map(Bytes::from)
            .map_err(|e| PipelineError::Delivery {
                stream: stream.name().to_string(),
                attempts: 0,
                reason: format!("failed to serialize batch: {}", e),
            })?;
        let channel = stream.channel();

        let outcome = self
            .policy
            .run(stream.name(), || {
                // a slow link must not look like a stalled task
                if let Some(heartbeat) = &self.heartbeat {
                    heartbeat.beat();
                }
                self.transport.send(payload.clone(), channel)
            })
            .await;

        match outcome {
            Delivery::Delivered { .. } => Ok(()),
            Delivery::Failed {
                attempts,
                last_error,
            } => Err(PipelineError::Delivery {
                stream: stream.name().to_string(),
                attempts,
                reason: last_error,
            }),
        }
    }
}
