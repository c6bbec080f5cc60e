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

// Durable per-stream delivery checkpoints in a fixed-layout slot file
//
// Slot layout (64 bytes, little endian):
//   [0..52)  resume marker, NUL padded
//   [52..60) byte offset (u64)
//   [60..64) CRC32 of bytes [0..60)
//
// A slot is always written with a single write of the whole slot, and
// slots never straddle a 512-byte sector.

use crate::error::{PipelineError, Result};
use crate::protocol::Stream;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

pub const MARKER_WIDTH: usize = 52;
pub const OFFSET_WIDTH: usize = 8;
const CHECKSUM_WIDTH: usize = 4;
pub const SLOT_WIDTH: usize = MARKER_WIDTH + OFFSET_WIDTH + CHECKSUM_WIDTH;

/// Resume position of a stream: the last delivered record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Timestamp prefix of the last delivered record; empty if nothing was delivered
    pub resume_marker: String,
    /// Start offset of the last delivered record's line
    pub byte_offset: u64,
}

impl Checkpoint {
    pub fn new(resume_marker: impl Into<String>, byte_offset: u64) -> Self {
        Self {
            resume_marker: resume_marker.into(),
            byte_offset,
        }
    }

    /// Checkpoint anchored on a delivered record.
    ///
    /// Markers match by prefix, so one longer than the slot is cut to fit.
    pub fn after_record(timestamp: &str, line_offset: u64) -> Self {
        let mut end = timestamp.len().min(MARKER_WIDTH);
        while !timestamp.is_char_boundary(end) {
            end -= 1;
        }
        Self::new(&timestamp[..end], line_offset)
    }

    pub fn is_empty(&self) -> bool {
        self.resume_marker.is_empty() && self.byte_offset == 0
    }
}

/// Fixed slot of the checkpoint file owned by one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointSlot(usize);

impl CheckpointSlot {
    pub fn for_stream(stream: &Stream) -> Self {
        Self(stream.index())
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn address(self) -> u64 {
        (self.0 * SLOT_WIDTH) as u64
    }

    fn encode(checkpoint: &Checkpoint) -> Result<[u8; SLOT_WIDTH]> {
        let marker = checkpoint.resume_marker.as_bytes();
        if marker.len() > MARKER_WIDTH {
            return Err(PipelineError::InvalidMarker {
                len: marker.len(),
                max: MARKER_WIDTH,
            });
        }

        let mut bytes = [0u8; SLOT_WIDTH];
        bytes[..marker.len()].copy_from_slice(marker);
        bytes[MARKER_WIDTH..MARKER_WIDTH + OFFSET_WIDTH]
            .copy_from_slice(&checkpoint.byte_offset.to_le_bytes());
        let crc = crc32fast::hash(&bytes[..MARKER_WIDTH + OFFSET_WIDTH]);
        bytes[MARKER_WIDTH + OFFSET_WIDTH..].copy_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }

    /// `None` when the slot fails its checksum.
    fn decode(bytes: &[u8; SLOT_WIDTH]) -> Option<Checkpoint> {
        if bytes.iter().all(|b| *b == 0) {
            return Some(Checkpoint::default());
        }

        let body = &bytes[..MARKER_WIDTH + OFFSET_WIDTH];
        let mut stored = [0u8; CHECKSUM_WIDTH];
        stored.copy_from_slice(&bytes[MARKER_WIDTH + OFFSET_WIDTH..]);
        if crc32fast::hash(body) != u32::from_le_bytes(stored) {
            return None;
        }

        let marker = &bytes[..MARKER_WIDTH];
        let marker_len = marker.iter().position(|b| *b == 0).unwrap_or(MARKER_WIDTH);
        let mut offset = [0u8; OFFSET_WIDTH];
        offset.copy_from_slice(&bytes[MARKER_WIDTH..MARKER_WIDTH + OFFSET_WIDTH]);

        Some(Checkpoint {
            resume_marker: String::from_utf8_lossy(&marker[..marker_len]).into_owned(),
            byte_offset: u64::from_le_bytes(offset),
        })
    }
}

/// Checkpoint file holding one slot per stream
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a stream's checkpoint; the zero checkpoint if never written.
    ///
    /// A torn slot also loads as the zero checkpoint, which redelivers the
    /// stream from the start rather than losing records.
    pub async fn load(&self, stream: &Stream) -> Result<Checkpoint> {
        let slot = CheckpointSlot::for_stream(stream);
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Checkpoint::default()),
            Err(e) => return Err(PipelineError::storage(stream.name(), e)),
        };

        file.seek(SeekFrom::Start(slot.address()))
            .await
            .map_err(|e| PipelineError::storage(stream.name(), e))?;

        let mut bytes = [0u8; SLOT_WIDTH];
        match file.read_exact(&mut bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(Checkpoint::default()),
            Err(e) => return Err(PipelineError::storage(stream.name(), e)),
        }

        match CheckpointSlot::decode(&bytes) {
            Some(checkpoint) => Ok(checkpoint),
            None => {
                warn!(
                    stream = %stream,
                    slot = slot.index(),
                    "Checkpoint slot failed its checksum; redelivering stream from the start"
                );
                Ok(Checkpoint::default())
            }
        }
    }

    /// Persist a checkpoint with one write of its whole slot, synced to disk.
    pub async fn save(&self, stream: &Stream, checkpoint: &Checkpoint) -> Result<()> {
        let slot = CheckpointSlot::for_stream(stream);
        let bytes = CheckpointSlot::encode(checkpoint)?;
        let write_err = |source| PipelineError::CheckpointWrite {
            slot: slot.index(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .await
            .map_err(write_err)?;

        file.seek(SeekFrom::Start(slot.address()))
            .await
            .map_err(write_err)?;
        file.write_all(&bytes).await.map_err(write_err)?;
        file.sync_data().await.map_err(write_err)?;

        debug!(
            stream = %stream,
            marker = %checkpoint.resume_marker,
            offset = checkpoint.byte_offset,
            "Checkpoint saved"
        );
        Ok(())
    }
}
