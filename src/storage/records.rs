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

// Append-only, line-oriented record logs, one file per stream

use crate::error::{PipelineError, Result};
use crate::protocol::Stream;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Directory of per-stream record logs.
///
/// Bytes already written are never rewritten or removed, so an offset taken
/// before a crash stays valid after restart.
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ensure the data directory exists
    pub async fn initialize(&self) -> Result<()> {
        if !self.root.exists() {
            info!("Creating record directory: {}", self.root.display());
            fs::create_dir_all(&self.root)
                .await
                .map_err(|e| PipelineError::storage(self.root.display().to_string(), e))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, stream: &Stream) -> PathBuf {
        self.root.join(stream.file_name())
    }

    /// Append one record, newline-terminated, and sync it to disk before
    /// returning.
    pub async fn append(&self, stream: &Stream, record: &str) -> Result<()> {
        if record.contains('\n') {
            return Err(PipelineError::storage(
                stream.name(),
                std::io::Error::new(ErrorKind::InvalidInput, "record spans multiple lines"),
            ));
        }

        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');

        let path = self.path(stream);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PipelineError::storage(stream.name(), e))?;

        // One write per record keeps concurrent readers from seeing a torn line
        // except at the very tail, which the reader holds back.
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| PipelineError::storage(stream.name(), e))?;
        file.sync_data()
            .await
            .map_err(|e| PipelineError::storage(stream.name(), e))?;

        debug!(stream = %stream, bytes = line.len(), "Appended record");
        Ok(())
    }

    /// Open a stream for reading; `None` if nothing was ever appended.
    pub async fn open_for_read(&self, stream: &Stream) -> Result<Option<RecordReader>> {
        match File::open(self.path(stream)).await {
            Ok(file) => Ok(Some(RecordReader::new(stream.name(), file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::storage(stream.name(), e)),
        }
    }
}

/// A complete line read from a record log
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    /// Byte offset of the first byte of the line
    pub offset: u64,
    /// Line content without its terminator; invalid UTF-8 is replaced
    pub text: String,
}

/// Sequential reader over one record log that tracks its byte position
pub struct RecordReader {
    stream: String,
    reader: BufReader<File>,
    position: u64,
}

impl RecordReader {
    fn new(stream: &str, file: File) -> Self {
        Self {
            stream: stream.to_string(),
            reader: BufReader::new(file),
            position: 0,
        }
    }

    /// Current byte position: the start of the next line to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub async fn seek(&mut self, offset: u64) -> Result<()> {
        self.reader
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| PipelineError::storage(&self.stream, e))?;
        self.position = offset;
        Ok(())
    }

    /// Current length of the underlying file.
    pub async fn file_len(&self) -> Result<u64> {
        self.reader
            .get_ref()
            .metadata()
            .await
            .map(|m| m.len())
            .map_err(|e| PipelineError::storage(&self.stream, e))
    }

    /// Read the next terminated line; `None` at end of stream.
    ///
    /// An unterminated tail is an append in flight or one torn by power loss.
    /// It is never returned: the reader rewinds to its start and reports end
    /// of stream.
    pub async fn read_line(&mut self) -> Result<Option<RawLine>> {
        let mut buf = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| PipelineError::storage(&self.stream, e))?;

        if n == 0 {
            return Ok(None);
        }

        if buf.last() != Some(&b'\n') {
            debug!(
                stream = %self.stream,
                offset = self.position,
                bytes = n,
                "Holding back unterminated tail"
            );
            let start = self.position;
            self.seek(start).await?;
            return Ok(None);
        }

        let offset = self.position;
        self.position += n as u64;
        buf.pop();

        Ok(Some(RawLine {
            offset,
            text: String::from_utf8_lossy(&buf).into_owned(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RecordStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::new(temp_dir.path().join("data"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_missing_stream_is_not_found() {
        let (store, _temp_dir) = create_test_store();
        store.initialize().await.unwrap();

        let reader = store.open_for_read(&Stream::errors()).await.unwrap();
        assert!(reader.is_none());
    }

    #[tokio::test]
    async fn test_append_then_read_tracks_offsets() {
        let (store, _temp_dir) = create_test_store();
        store.initialize().await.unwrap();
        let stream = Stream::errors();

        store.append(&stream, "t1;first").await.unwrap();
        store.append(&stream, "t2;second").await.unwrap();

        let mut reader = store.open_for_read(&stream).await.unwrap().unwrap();
        let first = reader.read_line().await.unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(first.text, "t1;first");

        let second = reader.read_line().await.unwrap().unwrap();
        assert_eq!(second.offset, 9);
        assert_eq!(second.text, "t2;second");
        assert_eq!(reader.position(), 19);
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seek_to_line_start() {
        let (store, _temp_dir) = create_test_store();
        store.initialize().await.unwrap();
        let stream = Stream::errors();

        store.append(&stream, "t1;a").await.unwrap();
        store.append(&stream, "t2;b").await.unwrap();

        let mut reader = store.open_for_read(&stream).await.unwrap().unwrap();
        reader.seek(5).await.unwrap();
        let line = reader.read_line().await.unwrap().unwrap();
        assert_eq!(line.text, "t2;b");
        assert_eq!(line.offset, 5);
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_held_back() {
        let (store, _temp_dir) = create_test_store();
        store.initialize().await.unwrap();
        let stream = Stream::errors();

        store.append(&stream, "t1;complete").await.unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.path(&stream))
            .await
            .unwrap();
        file.write_all(b"t2;torn").await.unwrap();
        file.flush().await.unwrap();

        let mut reader = store.open_for_read(&stream).await.unwrap().unwrap();
        assert_eq!(reader.read_line().await.unwrap().unwrap().text, "t1;complete");
        assert!(reader.read_line().await.unwrap().is_none());
        assert_eq!(reader.position(), 12);
    }

    #[tokio::test]
    async fn test_multiline_record_rejected() {
        let (store, _temp_dir) = create_test_store();
        store.initialize().await.unwrap();

        let result = store.append(&Stream::errors(), "t1;a\nt2;b").await;
        assert!(matches!(result, Err(PipelineError::Storage { .. })));
    }
}
