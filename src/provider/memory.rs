use super::{CacheProvider, ProviderError, SourceProvider};
use crate::image::{ImagePath, Resource};
use async_trait::async_trait;
use axum::body::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process source store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemorySourceProvider {
    entries: RwLock<HashMap<ImagePath, Bytes>>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SourceProvider for MemorySourceProvider {
    async fn get(&self, resource: &Resource) -> Result<Resource, ProviderError> {
        let entries = self.entries.read().await;
        let body = entries
            .get(resource.path())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(resource.path().to_string()))?;
        Ok(resource.with_body(body))
    }

    async fn set(&self, resource: &Resource) -> Result<(), ProviderError> {
        let body = resource
            .body()
            .cloned()
            .ok_or_else(|| ProviderError::EmptyBody(resource.path().to_string()))?;
        self.entries
            .write()
            .await
            .insert(resource.path().clone(), body);
        Ok(())
    }

    async fn del(&self, resource: &Resource) -> Result<(), ProviderError> {
        self.entries
            .write()
            .await
            .remove(resource.path())
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(resource.path().to_string()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// In-process variant store: path, then canonical options.
#[derive(Debug, Default)]
pub struct MemoryCacheProvider {
    entries: RwLock<HashMap<ImagePath, HashMap<String, Bytes>>>,
}

impl MemoryCacheProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached variants for `path`.
    pub async fn variant_count(&self, path: &ImagePath) -> usize {
        self.entries
            .read()
            .await
            .get(path)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, resource: &Resource) -> Result<Resource, ProviderError> {
        let entries = self.entries.read().await;
        let body = entries
            .get(resource.path())
            .and_then(|variants| variants.get(&resource.options().canonical()))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(resource.path().to_string()))?;
        Ok(resource.with_body(body))
    }

    async fn set(&self, resource: &Resource) -> Result<(), ProviderError> {
        let body = resource
            .body()
            .cloned()
            .ok_or_else(|| ProviderError::EmptyBody(resource.path().to_string()))?;
        self.entries
            .write()
            .await
            .entry(resource.path().clone())
            .or_default()
            .insert(resource.options().canonical(), body);
        Ok(())
    }

    async fn del(&self, resource: &Resource) -> Result<(), ProviderError> {
        self.entries
            .write()
            .await
            .remove(resource.path())
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(resource.path().to_string()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
