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

use std::time::Duration;
use tokio::sync::Notify;

/// How a wait on a [`WakeSignal`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Signaled,
    TimedOut,
}

/// Binary, coalescing wake-up from producers to one consumer.
///
/// Any number of `send` calls before the consumer waits collapse into a
/// single wake; nothing is queued.
#[derive(Debug, Default)]
pub struct WakeSignal {
    notify: Notify,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self) {
        // notify_one stores at most one permit when nobody is waiting
        self.notify.notify_one();
    }

    /// Wait for a signal or until `timeout` elapses, whichever is first.
    pub async fn wait(&self, timeout: Duration) -> Wake {
        match tokio::time::timeout(timeout, self.notify.notified()).await {
            Ok(()) => Wake::Signaled,
            Err(_) => Wake::TimedOut,
        }
    }
}
