//! Client configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Connection and loading settings shared by the fetcher and local predictors
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Account name sent with every remote request
    #[serde(default)]
    pub username: Option<String>,

    /// API key sent with every remote request
    #[serde(default)]
    pub api_key: Option<String>,

    /// API domain
    #[serde(default = "default_domain")]
    pub domain: String,

    /// `https` unless pointing at a development server
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Directory holding stored resource JSON files
    #[serde(default)]
    pub storage: Option<PathBuf>,

    /// Ensemble models fetched per batch
    #[serde(default = "default_max_models")]
    pub max_models: usize,

    /// Polls of an unfinished resource before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_domain() -> String {
    "bigml.io".to_string()
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_api_version() -> String {
    "andromeda".to_string()
}

fn default_max_models() -> usize {
    200
}

fn default_max_retries() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: None,
            api_key: None,
            domain: default_domain(),
            protocol: default_protocol(),
            api_version: default_api_version(),
            storage: None,
            max_models: default_max_models(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `BIGML_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("BIGML"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()
            .context("Failed to read BIGML_* environment")?;

        config
            .try_deserialize()
            .context("Failed to parse client configuration")
    }

    /// Base URL of the REST API, e.g. `https://bigml.io/andromeda/`
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}/{}/",
            self.protocol,
            self.domain.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Wait before poll number `attempt` (0 based), doubling up to the cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let wait = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(wait.min(self.max_backoff_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
