//! Request resolution: cache lookup, source fetch, render, and the
//! background cache maintenance that follows.

pub mod coalesce;

pub use coalesce::RenderCoalescer;

use crate::error::ImageApiError;
use crate::image::{
    DynTransformer, ImagePath, Options, Resource, ValidationError, detect_content_type,
    is_image_mime_type_supported,
};
use crate::metrics::{
    CACHE_HIT, CACHE_MISS, DynMetrics, IMAGE_DELIVERED_BYTES, IMAGE_RECEIVED_BYTES,
};
use crate::provider::{DynCacheProvider, DynSourceProvider, ProviderError};
use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Where a delivered image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Source,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Cache => "cache",
            Origin::Source => "source",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub resource: Resource,
    pub origin: Origin,
    /// Source generation the resource was rendered from.
    pub generation: u64,
}

/// Per-path counter bumped whenever a path's source changes, so renders of
/// an older source can be kept out of the cache.
#[derive(Debug, Default)]
struct SourceGenerations {
    generations: Mutex<HashMap<ImagePath, u64>>,
}

impl SourceGenerations {
    fn current(&self, path: &ImagePath) -> u64 {
        let generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        generations.get(path).copied().unwrap_or(0)
    }

    fn bump(&self, path: &ImagePath) {
        let mut generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        *generations.entry(path.clone()).or_default() += 1;
    }
}

/// Response body of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub file: String,
    pub size: usize,
    #[serde(rename = "type")]
    pub content_type: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteTarget {
    #[default]
    Cache,
    Source,
}

/// Which stores no longer hold the image after a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub cache: bool,
    pub source: bool,
}

pub struct ImagePipeline {
    source: DynSourceProvider,
    cache: DynCacheProvider,
    transformer: DynTransformer,
    metrics: DynMetrics,
    coalescer: Option<RenderCoalescer<(Resource, u64)>>,
    generations: Arc<SourceGenerations>,
    background: TaskTracker,
}

impl ImagePipeline {
    pub fn new(
        source: DynSourceProvider,
        cache: DynCacheProvider,
        transformer: DynTransformer,
        metrics: DynMetrics,
    ) -> Self {
        Self {
            source,
            cache,
            transformer,
            metrics,
            coalescer: None,
            generations: Arc::new(SourceGenerations::default()),
            background: TaskTracker::new(),
        }
    }

    /// Converge concurrent misses for the same variant onto one render.
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalescer = enabled.then(RenderCoalescer::new);
        self
    }

    /// Serves `resource` from the cache, or fetches and renders it from the
    /// source on a miss.
    pub async fn resolve(&self, resource: Resource) -> Result<Resolved, ImageApiError> {
        let path = resource.path().to_string();

        match self.cache.get(&resource).await {
            Ok(hit) => {
                debug!("Cache hit for {} ({})", path, hit.options());
                self.metrics.increment(CACHE_HIT, &[]);
                self.metrics
                    .increment_by(IMAGE_DELIVERED_BYTES, hit.size() as u64, &[]);
                return Ok(Resolved {
                    resource: hit,
                    origin: Origin::Cache,
                    generation: self.generations.current(resource.path()),
                });
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!("Cache lookup failed for {}, treating as miss: {}", path, e),
        }

        let (rendered, generation) = match &self.coalescer {
            Some(coalescer) => {
                let key = resource.variant_key();
                coalescer.run(key, || self.render(resource)).await?
            }
            None => self.render(resource).await?,
        };

        self.metrics.increment(CACHE_MISS, &[]);
        self.metrics
            .increment_by(IMAGE_DELIVERED_BYTES, rendered.size() as u64, &[]);
        Ok(Resolved {
            resource: rendered,
            origin: Origin::Source,
            generation,
        })
    }

    async fn render(&self, resource: Resource) -> Result<(Resource, u64), ImageApiError> {
        let path = resource.path().to_string();
        let generation = self.generations.current(resource.path());

        let original = match self.source.get(&resource).await {
            Ok(original) => original,
            Err(ProviderError::NotFound(_)) => {
                info!("Source image not found: {}", path);
                return Err(ImageApiError::NotFound(path));
            }
            Err(e) => {
                error!("Source fetch failed for {}: {}", path, e);
                return Err(ImageApiError::NotFound(path));
            }
        };

        let rendered = self.transformer.render(&original).await.map_err(|e| {
            error!("Failed to render {} ({}): {}", path, original.options(), e);
            ImageApiError::Transform(e)
        })?;
        Ok((rendered, generation))
    }

    /// Stores a freshly rendered variant without holding up the response.
    ///
    /// Nothing is stored when the source changed after `generation` was
    /// taken. A change that lands while the store is in progress evicts the
    /// path again.
    pub fn cache_in_background(&self, resource: Resource, generation: u64) {
        let cache = self.cache.clone();
        let generations = self.generations.clone();
        self.background.spawn(async move {
            let path = resource.path();
            if generations.current(path) != generation {
                debug!("Source of {} changed during render, not caching", path);
                return;
            }

            if let Err(e) = cache.set(&resource).await {
                error!(task = "cache_store", path = %path, "Background task failed: {}", e);
                return;
            }

            if generations.current(path) != generation {
                debug!("Source of {} changed while caching, evicting", path);
                match cache.del(&resource).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        error!(task = "cache_store", path = %path, "Background task failed: {}", e)
                    }
                }
            }
        });
    }

    fn evict_in_background(&self, resource: Resource) {
        let cache = self.cache.clone();
        self.background.spawn(async move {
            match cache.del(&resource).await {
                Ok(()) => debug!("Evicted cached variants of {}", resource.path()),
                Err(e) if e.is_not_found() => {}
                Err(e) => error!(
                    task = "cache_evict",
                    path = %resource.path(),
                    "Background task failed: {}",
                    e
                ),
            }
        });
    }

    /// Writes an uploaded image to the source and schedules eviction of every
    /// cached variant of its path.
    pub async fn ingest(&self, path: ImagePath, body: Bytes) -> Result<IngestReceipt, ImageApiError> {
        if body.is_empty() {
            return Err(ValidationError::InvalidUpload("empty image".to_string()).into());
        }

        let content_type = detect_content_type(&body);
        if !is_image_mime_type_supported(content_type) {
            return Err(ValidationError::InvalidUpload(format!(
                "unsupported content type {}",
                content_type
            ))
            .into());
        }

        let hash = format!("{:x}", md5::compute(&body));
        let size = body.len();
        let resource = Resource::new(path, Options::default()).with_body(body);

        self.source.set(&resource).await.map_err(|e| {
            error!("Failed to store {} in source: {}", resource.path(), e);
            ImageApiError::Backend(e)
        })?;
        self.generations.bump(resource.path());
        info!("Stored {} ({} bytes, {})", resource.path(), size, content_type);

        self.metrics
            .increment_by(IMAGE_RECEIVED_BYTES, size as u64, &[]);
        self.evict_in_background(Resource::new(resource.path().clone(), Options::default()));

        Ok(IngestReceipt {
            file: format!("/{}", resource.path()),
            size,
            content_type: content_type.to_string(),
            hash,
        })
    }

    /// Deletes the image from the requested stores. The source goes first so
    /// the cache cannot be refilled from it afterwards.
    pub async fn evict(&self, path: ImagePath, target: DeleteTarget) -> DeleteOutcome {
        let resource = Resource::new(path, Options::default());

        let source = match target {
            DeleteTarget::Source => {
                let result = self.source.del(&resource).await;
                self.generations.bump(resource.path());
                deleted(result, "source", &resource)
            }
            DeleteTarget::Cache => false,
        };
        let cache = deleted(self.cache.del(&resource).await, "cache", &resource);

        DeleteOutcome { cache, source }
    }

    /// Waits for detached cache work to finish. New work may be scheduled
    /// again afterwards.
    pub async fn wait_for_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }
}

fn deleted(result: Result<(), ProviderError>, store: &str, resource: &Resource) -> bool {
    match result {
        Ok(()) => {
            info!("Deleted {} from {}", resource.path(), store);
            true
        }
        Err(e) if e.is_not_found() => {
            debug!("{} was not in {}", resource.path(), store);
            true
        }
        Err(e) => {
            error!("Failed to delete {} from {}: {}", resource.path(), store, e);
            false
        }
    }
}
