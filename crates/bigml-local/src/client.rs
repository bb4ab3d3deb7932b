//! REST client fetching finished resources

use crate::config::ClientConfig;
use crate::loader::ResourceFetcher;
use crate::resource::{ResourceId, Status, StatusCode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// API client polling resources until they are finished
pub struct ApiClient {
    client: Client,
    base_url: Url,
    username: String,
    api_key: String,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl ApiClient {
    /// Create a new API client from client settings
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&config.base_url()).context("Invalid API URL")?;
        let username = config.username.clone().context("Missing BIGML_USERNAME")?;
        let api_key = config.api_key.clone().context("Missing BIGML_API_KEY")?;

        Ok(Self {
            client,
            base_url,
            username,
            api_key,
            max_retries: config.max_retries.max(1),
            initial_backoff: config.backoff(0),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        })
    }

    /// Make a single GET request for a resource
    pub async fn get(&self, id: &ResourceId) -> Result<Value> {
        let mut url = self.base_url.join(&id.to_string()).context("Invalid path")?;
        url.query_pairs_mut()
            .append_pair("username", &self.username)
            .append_pair("api_key", &self.api_key)
            .append_pair("limit", "-1");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[async_trait]
impl ResourceFetcher for ApiClient {
    async fn fetch_finished(&self, id: &ResourceId) -> Result<Value> {
        for attempt in 0..self.max_retries {
            let resource = self.get(id).await?;
            let status = Status::from_resource(&resource)
                .with_context(|| format!("Resource {} has no status", id))?;
            match status.code {
                StatusCode::Finished => return Ok(resource),
                StatusCode::Faulty => {
                    anyhow::bail!("Resource {} is faulty: {}", id, status.message)
                }
                code => {
                    let wait = self.backoff(attempt);
                    debug!(
                        resource = %id,
                        status = code.as_i32(),
                        wait_ms = wait.as_millis() as u64,
                        "Resource not finished yet"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
        anyhow::bail!(
            "Resource {} did not finish after {} polls",
            id,
            self.max_retries
        )
    }
}
