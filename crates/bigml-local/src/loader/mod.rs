//! Resource resolution for local predictors
//!
//! A [`ResourceLoader`] turns a [`ResourceRef`] into a finished resource JSON.
//! Sources are tried in order: inline JSON, a local file, the storage
//! directory, the cache and finally the remote fetcher. The loader itself
//! never retries; polling belongs to the fetcher.

mod cache;
mod readiness;

pub use cache::{MemoryCache, ResourceCache};
pub use readiness::Readiness;

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::LoadError;
use crate::observability::LocalMetrics;
use crate::resource::{finished_body, is_finished, ResourceId, ResourceType};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Default number of ensemble models fetched per batch
pub const DEFAULT_MAX_MODELS: usize = 200;

/// Remote source of finished resources
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetches a resource once it is finished; faulty resources are errors
    async fn fetch_finished(&self, id: &ResourceId) -> anyhow::Result<Value>;
}

/// What a local predictor is built from
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRef {
    /// Resource JSON, used as is when finished
    Json(Value),
    /// Path to a JSON file or a resource id
    Reference(String),
}

impl From<Value> for ResourceRef {
    fn from(value: Value) -> Self {
        ResourceRef::Json(value)
    }
}

impl From<&str> for ResourceRef {
    fn from(reference: &str) -> Self {
        ResourceRef::Reference(reference.to_string())
    }
}

impl From<String> for ResourceRef {
    fn from(reference: String) -> Self {
        ResourceRef::Reference(reference)
    }
}

impl From<&Path> for ResourceRef {
    fn from(path: &Path) -> Self {
        ResourceRef::Reference(path.display().to_string())
    }
}

impl From<&ResourceId> for ResourceRef {
    fn from(id: &ResourceId) -> Self {
        ResourceRef::Reference(id.to_string())
    }
}

impl ResourceRef {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            ResourceRef::Json(value) => crate::resource::resource_name(value),
            ResourceRef::Reference(reference) => reference.clone(),
        }
    }
}

/// Resolves resource references into finished resource JSON
pub struct ResourceLoader {
    storage: Option<PathBuf>,
    cache: Option<Arc<dyn ResourceCache>>,
    fetcher: Option<Arc<dyn ResourceFetcher>>,
    max_models: usize,
    metrics: LocalMetrics,
}

impl Default for ResourceLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("storage", &self.storage)
            .field("cache", &self.cache.is_some())
            .field("fetcher", &self.fetcher.is_some())
            .field("max_models", &self.max_models)
            .finish()
    }
}

impl ResourceLoader {
    /// A loader resolving inline JSON and local files only
    pub fn new() -> Self {
        Self {
            storage: None,
            cache: None,
            fetcher: None,
            max_models: DEFAULT_MAX_MODELS,
            metrics: LocalMetrics::new(),
        }
    }

    /// Builds a loader from client settings.
    ///
    /// A remote fetcher is configured only when credentials are present.
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let mut loader = Self::new().with_max_models(config.max_models);
        if let Some(storage) = &config.storage {
            loader = loader.with_storage(storage);
        }
        if config.username.is_some() && config.api_key.is_some() {
            let client = ApiClient::new(config).context("Failed to create API client")?;
            loader = loader.with_fetcher(Arc::new(client));
        }
        Ok(loader)
    }

    /// Directory of stored `<type>_<id>` resource files
    pub fn with_storage(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage = Some(dir.into());
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResourceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Ensemble models fetched per batch, at least one
    pub fn with_max_models(mut self, max_models: usize) -> Self {
        self.max_models = max_models.max(1);
        self
    }

    pub fn max_models(&self) -> usize {
        self.max_models
    }

    pub fn storage(&self) -> Option<&Path> {
        self.storage.as_deref()
    }

    /// Resolves a finished inline JSON without suspending.
    ///
    /// `None` when the reference needs a lookup.
    pub fn resolve_inline(&self, reference: &ResourceRef, kind: ResourceType) -> Option<Result<Value, LoadError>> {
        let ResourceRef::Json(value) = reference else {
            return None;
        };
        if !is_finished(value) {
            return None;
        }
        let result = checked(value.clone(), kind);
        self.record("inline", &result);
        Some(result)
    }

    /// Resolves `reference` into a finished resource of type `kind`
    pub async fn load(&self, reference: &ResourceRef, kind: ResourceType) -> Result<Value, LoadError> {
        if let Some(result) = self.resolve_inline(reference, kind) {
            return result;
        }
        let result = self.lookup(reference, kind).await;
        match &result {
            Ok(value) => info!(
                resource = %crate::resource::resource_name(value),
                kind = %kind,
                "Resource loaded"
            ),
            Err(err) => warn!(
                reference = %reference.describe(),
                kind = %kind,
                error = %err,
                "Failed to load resource"
            ),
        }
        result
    }

    async fn lookup(&self, reference: &ResourceRef, kind: ResourceType) -> Result<Value, LoadError> {
        let reference = match reference {
            ResourceRef::Json(value) => ResourceId::from_value(value)?.to_string(),
            ResourceRef::Reference(reference) => reference.clone(),
        };

        let path = Path::new(&reference);
        if path.is_file() {
            debug!(path = %path.display(), "Reading resource from file");
            let result = read_json(path).await.and_then(|value| checked(value, kind));
            self.record("file", &result);
            return result;
        }

        let id = ResourceId::parse(&reference)?;
        if id.kind != kind {
            return Err(LoadError::InvalidId(format!("{} is not a {}", id, kind)));
        }

        if let Some(dir) = &self.storage {
            let stored = dir.join(id.storage_name());
            if stored.is_file() {
                debug!(resource = %id, path = %stored.display(), "Reading resource from storage");
                let result = read_json(&stored).await.and_then(|value| checked(value, kind));
                self.record("storage", &result);
                return result;
            }
        }

        let key = id.to_string();
        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(value)) if is_finished(&value) => {
                    debug!(resource = %id, "Resource found in cache");
                    let result = checked(value, kind);
                    self.record("cache", &result);
                    return result;
                }
                Ok(Some(_)) => debug!(resource = %id, "Cached resource is not finished"),
                Ok(None) => {}
                Err(err) => warn!(resource = %id, error = %err, "Cache lookup failed"),
            }
        }

        let Some(fetcher) = &self.fetcher else {
            let err = LoadError::NoSource(key);
            self.metrics.inc_load_failures();
            return Err(err);
        };
        debug!(resource = %id, "Fetching resource");
        let result = fetcher
            .fetch_finished(&id)
            .await
            .map_err(|err| LoadError::Remote(format!("{:#}", err)))
            .and_then(|value| checked(value, kind));
        self.record("remote", &result);
        let value = result?;

        if let Some(dir) = &self.storage {
            let stored = dir.join(id.storage_name());
            if let Err(err) = store_json(&stored, &value).await {
                warn!(resource = %id, error = %format!("{:#}", err), "Failed to store resource");
            }
        }
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(&key, &value).await {
                warn!(resource = %id, error = %err, "Failed to cache resource");
            }
        }
        Ok(value)
    }

    fn record(&self, source: &str, result: &Result<Value, LoadError>) {
        match result {
            Ok(_) => self.metrics.inc_resources_loaded(source),
            Err(_) => self.metrics.inc_load_failures(),
        }
    }
}

fn checked(value: Value, kind: ResourceType) -> Result<Value, LoadError> {
    finished_body(&value, kind.structure_key())?;
    Ok(value)
}

async fn read_json(path: &Path) -> Result<Value, LoadError> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

/// Writes through a temp file so readers never see partial JSON
async fn store_json(path: &Path, value: &Value) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create storage directory {:?}", dir))?;
    }
    let temp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec(value).context("Failed to serialize resource JSON")?;
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .with_context(|| format!("Failed to create temp resource file {:?}", temp_path))?;
    file.write_all(&bytes).await.context("Failed to write resource JSON")?;
    file.flush().await.context("Failed to flush resource file")?;
    file.sync_all().await.context("Failed to sync resource file")?;

    tokio::fs::rename(&temp_path, path)
        .await
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
    Ok(())
}
