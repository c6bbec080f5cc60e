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

// Filesystem transport implementation

use super::backend::Transport;
use crate::config::FilesystemConfig;
use crate::protocol::Channel;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const CHANNELS: [Channel; 3] = [Channel::Push, Channel::Errors, Channel::Readings];

/// Spools every payload as a JSON file under `<spool_dir>/<channel>/`
pub struct FilesystemTransport {
    spool_dir: PathBuf,
}

impl FilesystemTransport {
    pub fn new(config: FilesystemConfig) -> Result<Self> {
        let spool_dir = PathBuf::from(&config.spool_dir);

        info!(
            "Initializing filesystem transport at: {}",
            spool_dir.display()
        );

        Ok(Self { spool_dir })
    }

    fn channel_dir(&self, channel: Channel) -> PathBuf {
        self.spool_dir.join(channel.as_str())
    }

    /// Spool file for a payload; names sort by arrival time
    fn payload_path(&self, channel: Channel) -> PathBuf {
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or_default();
        let filename = format!("{:020}-{}.json", timestamp_us, uuid::Uuid::new_v4());
        self.channel_dir(channel).join(filename)
    }
}

#[async_trait]
impl Transport for FilesystemTransport {
    async fn connected(&self) -> bool {
        for channel in CHANNELS {
            match fs::metadata(self.channel_dir(channel)).await {
                Ok(metadata) if metadata.is_dir() => {}
                _ => return false,
            }
        }
        true
    }

    async fn connect(&self) -> Result<()> {
        for channel in CHANNELS {
            let dir = self.channel_dir(channel);
            if !dir.exists() {
                debug!("Creating spool directory: {}", dir.display());
                fs::create_dir_all(&dir)
                    .await
                    .context("Failed to create spool directory")?;
            }
        }
        Ok(())
    }

    async fn send(&self, payload: Bytes, channel: Channel) -> Result<()> {
        let path = self.payload_path(channel);

        let mut file = fs::File::create(&path)
            .await
            .context(format!("Failed to create file: {}", path.display()))?;

        if let Err(e) = file.write_all(&payload).await {
            warn!("Spool write failed for {}: {}", path.display(), e);
            let _ = fs::remove_file(&path).await;
            return Err(e).context("Failed to write payload");
        }

        file.sync_data().await.context("Failed to sync payload")?;

        debug!(
            "Spooled {} bytes on channel '{}' to {}",
            payload.len(),
            channel,
            path.display()
        );

        Ok(())
    }

    fn transport_type(&self) -> &str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_transport() -> (FilesystemTransport, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = FilesystemConfig {
            spool_dir: temp_dir.path().join("spool").to_string_lossy().to_string(),
        };
        let transport = FilesystemTransport::new(config).unwrap();
        (transport, temp_dir)
    }

    #[tokio::test]
    async fn test_connect_creates_channel_dirs() {
        let (transport, _temp_dir) = create_test_transport();
        assert!(!transport.connected().await);

        transport.connect().await.unwrap();

        assert!(transport.connected().await);
        assert!(transport.channel_dir(Channel::Errors).exists());
        assert!(transport.channel_dir(Channel::Readings).exists());
        assert!(transport.channel_dir(Channel::Push).exists());
    }

    #[tokio::test]
    async fn test_send_spools_payload() {
        let (transport, _temp_dir) = create_test_transport();
        transport.connect().await.unwrap();

        let payload = Bytes::from_static(br#"{"device":"d","errors":[]}"#);
        transport
            .send(payload.clone(), Channel::Errors)
            .await
            .unwrap();

        let mut entries = std::fs::read_dir(transport.channel_dir(Channel::Errors))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect::<Vec<_>>();
        assert_eq!(entries.len(), 1);
        let written = std::fs::read(entries.pop().unwrap()).unwrap();
        assert_eq!(written, payload.to_vec());
    }

    #[tokio::test]
    async fn test_send_without_connect_fails() {
        let (transport, _temp_dir) = create_test_transport();
        let result = transport
            .send(Bytes::from_static(b"{}"), Channel::Readings)
            .await;
        assert!(result.is_err());
    }
}
