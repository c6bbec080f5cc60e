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

// HTTP transport implementation

use super::backend::Transport;
use crate::config::HttpConfig;
use crate::protocol::Channel;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// HTTP client posting JSON documents to the API and the push endpoint
pub struct HttpTransport {
    client: Client,
    api_url: String,
    push_url: String,
    errors_path: String,
    readings_path: String,
    health_path: String,
    connected: AtomicBool,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut client_builder = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout_seconds));

        // Add API token if provided
        if let Some(token) = &config.api_token {
            let mut headers = reqwest::header::HeaderMap::new();
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_value).context("Invalid API token")?,
            );
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            push_url: config.push_url,
            errors_path: config.errors_path,
            readings_path: config.readings_path,
            health_path: config.health_path,
            connected: AtomicBool::new(false),
        })
    }

    fn endpoint(&self, channel: Channel) -> String {
        match channel {
            Channel::Push => self.push_url.clone(),
            Channel::Errors => format!("{}{}", self.api_url, self.errors_path),
            Channel::Readings => format!("{}{}", self.api_url, self.readings_path),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn connect(&self) -> Result<()> {
        let url = format!("{}{}", self.api_url, self.health_path);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Connected to API at {}", self.api_url);
                self.connected.store(true, Ordering::Release);
                Ok(())
            }
            Ok(response) => {
                self.connected.store(false, Ordering::Release);
                bail!("API health check failed with status {}", response.status())
            }
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                Err(e).context("API unreachable")
            }
        }
    }

    async fn send(&self, payload: Bytes, channel: Channel) -> Result<()> {
        let url = self.endpoint(channel);
        debug!("Posting {} bytes to {} ({})", payload.len(), url, channel);

        let response = match self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.is_connect() || e.is_timeout() {
                    warn!("Link to {} lost: {}", url, e);
                    self.connected.store(false, Ordering::Release);
                }
                return Err(e).context("Failed to send request");
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!(
                "Delivery on channel '{}' failed with status {}: {}",
                channel,
                status,
                error_text
            );
        }

        Ok(())
    }

    fn transport_type(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_per_channel() {
        let transport = HttpTransport::new(HttpConfig {
            api_url: "http://api.local:8080/".to_string(),
            push_url: "http://push.local/live".to_string(),
            ..HttpConfig::default()
        })
        .unwrap();

        assert_eq!(transport.endpoint(Channel::Push), "http://push.local/live");
        assert_eq!(
            transport.endpoint(Channel::Errors),
            "http://api.local:8080/api/v1/errors"
        );
        assert_eq!(
            transport.endpoint(Channel::Readings),
            "http://api.local:8080/api/v1/readings"
        );
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let transport = HttpTransport::new(HttpConfig::default()).unwrap();
        assert!(!transport.connected().await);
        assert_eq!(transport.transport_type(), "http");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = HttpTransport::new(HttpConfig {
            api_token: Some("bad\ntoken".to_string()),
            ..HttpConfig::default()
        });
        assert!(result.is_err());
    }
}
