//! Storage backends for original images (source) and rendered variants
//! (cache). Providers move bytes; they know nothing about transformations.

pub mod config;
pub mod error;
pub mod fs;
pub mod memory;

pub use config::*;
pub use error::*;

use crate::image::Resource;
use async_trait::async_trait;
use std::sync::Arc;

/// Original images, keyed by path.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn get(&self, resource: &Resource) -> Result<Resource, ProviderError>;
    async fn set(&self, resource: &Resource) -> Result<(), ProviderError>;
    async fn del(&self, resource: &Resource) -> Result<(), ProviderError>;
    fn name(&self) -> &str;
}

/// Rendered variants, keyed by path and canonical options.
///
/// `del` evicts every variant of the resource's path, whatever its options.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    async fn get(&self, resource: &Resource) -> Result<Resource, ProviderError>;
    async fn set(&self, resource: &Resource) -> Result<(), ProviderError>;
    async fn del(&self, resource: &Resource) -> Result<(), ProviderError>;
    fn name(&self) -> &str;
}

pub type DynSourceProvider = Arc<dyn SourceProvider>;
pub type DynCacheProvider = Arc<dyn CacheProvider>;

pub fn create_source_provider(config: &SourceProviderConfig) -> DynSourceProvider {
    match config {
        SourceProviderConfig::Fs(fs_config) => {
            Arc::new(fs::FsSourceProvider::new(fs_config.path.clone()))
        }
        SourceProviderConfig::Memory => Arc::new(memory::MemorySourceProvider::new()),
    }
}

pub fn create_cache_provider(config: &CacheProviderConfig) -> DynCacheProvider {
    match config {
        CacheProviderConfig::Fs(fs_config) => {
            Arc::new(fs::FsCacheProvider::new(fs_config.path.clone()))
        }
        CacheProviderConfig::Memory => Arc::new(memory::MemoryCacheProvider::new()),
    }
}
