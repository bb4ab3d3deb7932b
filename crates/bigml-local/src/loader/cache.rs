//! Pluggable resource caches

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

/// Key/value store for resource JSON, keyed by resource id
#[async_trait]
pub trait ResourceCache: Send + Sync {
    /// Looks up a resource, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores a resource after a remote fetch
    async fn put(&self, _key: &str, _value: &Value) -> Result<()> {
        Ok(())
    }
}

/// In-process cache shared by every loader holding it
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Value>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResourceCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }
}
