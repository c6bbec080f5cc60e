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

// Resume scanner: position a record reader at the first record to (re)send

use super::checkpoint::Checkpoint;
use super::records::RecordReader;
use crate::error::Result;
use tracing::{debug, warn};

/// Result of locating the resume point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The reader sits at the first record not yet delivered
    Positioned,
    /// Nothing to resume from this cycle
    NotFound,
    /// Lines follow the offset but none of them is the anchor; the log was
    /// rewritten in place and the stream stays parked until it is repaired
    AnchorMissing,
}

/// Position `reader` at the resume point described by `checkpoint`.
///
/// The byte offset bounds where scanning starts; the marker names the anchor
/// record, the last one delivered:
/// - empty marker: resume at the first line at or after the offset;
/// - otherwise: skip to the first line starting with the marker and resume
///   right after it. Normally that line sits exactly at the offset.
///
/// An offset past the end of the file means the log was truncated behind our
/// back. The whole file is then searched for the marker, and if the anchor is
/// gone the stream is redelivered from the start.
pub async fn locate(reader: &mut RecordReader, checkpoint: &Checkpoint) -> Result<ScanOutcome> {
    let len = reader.file_len().await?;
    let mut start = checkpoint.byte_offset;
    let truncated = start > len;
    if truncated {
        warn!(
            offset = start,
            file_len = len,
            "Checkpoint offset beyond end of log; rescanning from the start"
        );
        start = 0;
    }

    reader.seek(start).await?;

    if checkpoint.resume_marker.is_empty() {
        return first_line_at(reader, start).await;
    }

    let mut scanned = 0usize;
    while let Some(line) = reader.read_line().await? {
        scanned += 1;
        if line.text.trim_start().starts_with(&checkpoint.resume_marker) {
            debug!(
                marker = %checkpoint.resume_marker,
                anchor = line.offset,
                resume_at = reader.position(),
                "Found resume anchor"
            );
            return Ok(ScanOutcome::Positioned);
        }
    }

    if truncated {
        warn!(
            marker = %checkpoint.resume_marker,
            "Resume anchor missing from truncated log; redelivering from the start"
        );
        reader.seek(0).await?;
        return first_line_at(reader, 0).await;
    }

    if scanned == 0 {
        debug!(
            marker = %checkpoint.resume_marker,
            offset = checkpoint.byte_offset,
            "No lines after checkpoint offset; skipping stream this cycle"
        );
        return Ok(ScanOutcome::NotFound);
    }

    warn!(
        marker = %checkpoint.resume_marker,
        offset = checkpoint.byte_offset,
        scanned,
        "Resume anchor missing from log; stream skipped until the anchor reappears"
    );
    Ok(ScanOutcome::AnchorMissing)
}

async fn first_line_at(reader: &mut RecordReader, offset: u64) -> Result<ScanOutcome> {
    match reader.read_line().await? {
        Some(_) => {
            reader.seek(offset).await?;
            Ok(ScanOutcome::Positioned)
        }
        None => Ok(ScanOutcome::NotFound),
    }
}
