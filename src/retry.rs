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

// Bounded retry policy for delivery attempts

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Outcome of running a retryable operation under a [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered { attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered { .. })
    }
}

/// Fixed attempt budget with an optional constant pause between attempts.
///
/// The default is 5 attempts back to back; callers space out whole cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `attempt` until it succeeds or the budget is spent.
    pub async fn run<F, Fut>(&self, label: &str, mut attempt: F) -> Delivery
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;
            match attempt().await {
                Ok(()) => {
                    if attempts > 1 {
                        info!("Delivered '{}' after {} attempts", label, attempts);
                    }
                    return Delivery::Delivered { attempts };
                }
                Err(e) if attempts < self.max_attempts => {
                    warn!(
                        "Delivery of '{}' failed (attempt {}/{}): {}. Retrying",
                        label, attempts, self.max_attempts, e
                    );
                    if !self.backoff.is_zero() {
                        sleep(self.backoff).await;
                    }
                }
                Err(e) => {
                    error!(
                        "Delivery of '{}' failed after {} attempts: {}",
                        label, attempts, e
                    );
                    return Delivery::Failed {
                        attempts,
                        last_error: e.to_string(),
                    };
                }
            }
        }
    }
}
