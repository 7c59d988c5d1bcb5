use super::{CacheProvider, ProviderError, SourceProvider};
use crate::image::Resource;
use async_trait::async_trait;
use axum::body::Bytes;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Source images stored as plain files under `root`, at their logical path.
#[derive(Debug, Clone)]
pub struct FsSourceProvider {
    root: PathBuf,
}

impl FsSourceProvider {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn file_path(&self, resource: &Resource) -> PathBuf {
        self.root.join(resource.path().as_str())
    }
}

#[async_trait]
impl SourceProvider for FsSourceProvider {
    async fn get(&self, resource: &Resource) -> Result<Resource, ProviderError> {
        let path = self.file_path(resource);
        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| ProviderError::from_io(e, resource.path().as_str()))?;
        Ok(resource.with_body(Bytes::from(body)))
    }

    async fn set(&self, resource: &Resource) -> Result<(), ProviderError> {
        let body = resource
            .body()
            .ok_or_else(|| ProviderError::EmptyBody(resource.path().to_string()))?;
        write_atomic(&self.file_path(resource), body).await
    }

    async fn del(&self, resource: &Resource) -> Result<(), ProviderError> {
        tokio::fs::remove_file(self.file_path(resource))
            .await
            .map_err(|e| ProviderError::from_io(e, resource.path().as_str()))
    }

    fn name(&self) -> &str {
        "fs"
    }
}

/// Rendered variants stored as `root/<xx>/<path hash>/<variant hash>`, so all
/// variants of one path share a directory and can be evicted together.
#[derive(Debug, Clone)]
pub struct FsCacheProvider {
    root: PathBuf,
}

impl FsCacheProvider {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_directory(&self, resource: &Resource) -> PathBuf {
        let path_key = resource.path_key();
        self.root.join(&path_key[..2]).join(path_key)
    }

    fn variant_path(&self, resource: &Resource) -> PathBuf {
        self.path_directory(resource).join(resource.variant_key())
    }
}

#[async_trait]
impl CacheProvider for FsCacheProvider {
    async fn get(&self, resource: &Resource) -> Result<Resource, ProviderError> {
        let path = self.variant_path(resource);
        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| ProviderError::from_io(e, resource.path().as_str()))?;
        debug!("Cache file hit: {:?}", path);
        Ok(resource.with_body(Bytes::from(body)))
    }

    async fn set(&self, resource: &Resource) -> Result<(), ProviderError> {
        let body = resource
            .body()
            .ok_or_else(|| ProviderError::EmptyBody(resource.path().to_string()))?;
        write_atomic(&self.variant_path(resource), body).await
    }

    async fn del(&self, resource: &Resource) -> Result<(), ProviderError> {
        tokio::fs::remove_dir_all(self.path_directory(resource))
            .await
            .map_err(|e| ProviderError::from_io(e, resource.path().as_str()))
    }

    fn name(&self) -> &str {
        "fs"
    }
}

/// Writes to a temporary file in the target directory, then renames it into
/// place. Readers see either the old file or the new one.
async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), ProviderError> {
    let directory = path
        .parent()
        .ok_or_else(|| ProviderError::NotFound(path.display().to_string()))?;
    tokio::fs::create_dir_all(directory).await?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = directory.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = async {
        tokio::fs::write(&temp_path, body).await?;
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImagePath, OptionParser, Options};
    use axum::http::HeaderMap;
    use tempfile::TempDir;

    fn resource(path: &str, query: &str) -> Resource {
        let options = if query.is_empty() {
            Options::default()
        } else {
            OptionParser::default().parse(query, &HeaderMap::new()).unwrap()
        };
        Resource::new(ImagePath::parse(path).unwrap(), options)
    }

    #[tokio::test]
    async fn test_source_roundtrip_in_nested_directory() {
        let dir = TempDir::new().unwrap();
        let provider = FsSourceProvider::new(dir.path().to_path_buf());
        let stored = resource("/albums/2024/cat.jpg", "").with_body(Bytes::from_static(b"abc"));

        provider.set(&stored).await.unwrap();
        assert!(dir.path().join("albums/2024/cat.jpg").exists());

        let loaded = provider.get(&resource("/albums/2024/cat.jpg", "")).await.unwrap();
        assert_eq!(loaded.body().unwrap().as_ref(), b"abc");
    }

    #[tokio::test]
    async fn test_source_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let provider = FsSourceProvider::new(dir.path().to_path_buf());

        let err = provider.get(&resource("/nope.jpg", "")).await.unwrap_err();
        assert!(err.is_not_found());
        let err = provider.del(&resource("/nope.jpg", "")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_set_requires_body() {
        let dir = TempDir::new().unwrap();
        let provider = FsSourceProvider::new(dir.path().to_path_buf());
        let err = provider.set(&resource("/cat.jpg", "")).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyBody(_)));
    }

    #[tokio::test]
    async fn test_set_overwrites_without_leaving_temp_files() {
        let dir = TempDir::new().unwrap();
        let provider = FsSourceProvider::new(dir.path().to_path_buf());

        provider
            .set(&resource("/cat.jpg", "").with_body(Bytes::from_static(b"first")))
            .await
            .unwrap();
        provider
            .set(&resource("/cat.jpg", "").with_body(Bytes::from_static(b"second")))
            .await
            .unwrap();

        let loaded = provider.get(&resource("/cat.jpg", "")).await.unwrap();
        assert_eq!(loaded.body().unwrap().as_ref(), b"second");

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_variants_are_separate_and_evicted_together() {
        let dir = TempDir::new().unwrap();
        let provider = FsCacheProvider::new(dir.path().to_path_buf());

        let small = resource("/cat.jpg", "width=100").with_body(Bytes::from_static(b"small"));
        let large = resource("/cat.jpg", "width=800").with_body(Bytes::from_static(b"large"));
        let other = resource("/dog.jpg", "width=100").with_body(Bytes::from_static(b"dog"));
        provider.set(&small).await.unwrap();
        provider.set(&large).await.unwrap();
        provider.set(&other).await.unwrap();

        let hit = provider.get(&resource("/cat.jpg", "w=100")).await.unwrap();
        assert_eq!(hit.body().unwrap().as_ref(), b"small");

        provider.del(&resource("/cat.jpg", "")).await.unwrap();
        assert!(provider.get(&small).await.unwrap_err().is_not_found());
        assert!(provider.get(&large).await.unwrap_err().is_not_found());
        assert!(provider.get(&other).await.is_ok());

        let err = provider.del(&resource("/cat.jpg", "")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
