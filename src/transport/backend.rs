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

// Transport trait for delivering payloads to remote sinks

use crate::protocol::Channel;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Generic network transport
///
/// Implementations own their connection state. A failed `send` is a delivery
/// failure for that attempt only; retry policy belongs to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the link is believed to be up
    async fn connected(&self) -> bool;

    /// Bring the link up
    async fn connect(&self) -> Result<()>;

    /// Deliver one JSON payload on a channel
    ///
    /// # Arguments
    /// * `payload` - Serialized JSON document
    /// * `channel` - Push channel or API endpoint selector
    async fn send(&self, payload: Bytes, channel: Channel) -> Result<()>;

    /// Get transport type identifier
    fn transport_type(&self) -> &str;
}
