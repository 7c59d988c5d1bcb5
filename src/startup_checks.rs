use crate::Config;
use crate::auth::DEFAULT_SECRET;
use crate::provider::{CacheProviderConfig, SourceProviderConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create {store} directory {path:?}: {source}")]
    DirectoryCreationFailed {
        store: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{store} directory {path:?} is not accessible: {source}")]
    DirectoryNotAccessible {
        store: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Authorization uses the default secret")]
    DefaultSecret,

    #[error("No image extensions are enabled")]
    NoSupportedExtensions,
}

impl StartupCheckError {
    /// Whether the server cannot run with this failure.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            StartupCheckError::DirectoryCreationFailed { .. }
                | StartupCheckError::DirectoryNotAccessible { .. }
        )
    }
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    if let SourceProviderConfig::Fs(fs) = &config.image.source
        && let Err(e) = check_directory("source", &fs.path).await
    {
        errors.push(e);
    }

    if let CacheProviderConfig::Fs(fs) = &config.image.cache
        && let Err(e) = check_directory("cache", &fs.path).await
    {
        errors.push(e);
    }

    if config.auth.enabled && config.auth.secret == DEFAULT_SECRET {
        warn!("Authorization is enabled with the default secret; set auth.secret");
        errors.push(StartupCheckError::DefaultSecret);
    }

    let extensions = &config.image.support.extensions;
    if extensions.is_empty() {
        warn!("No image extensions are enabled; every image request will be rejected");
        errors.push(StartupCheckError::NoSupportedExtensions);
    } else {
        info!(
            "Supported extensions: {}",
            extensions.iter().collect::<Vec<_>>().join(", ")
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

async fn check_directory(store: &'static str, path: &Path) -> Result<(), StartupCheckError> {
    if !path.exists() {
        info!("{} directory does not exist, creating: {:?}", store, path);
        if let Err(e) = tokio::fs::create_dir_all(path).await {
            error!("Failed to create {} directory: {}", store, e);
            return Err(StartupCheckError::DirectoryCreationFailed {
                store,
                path: path.to_path_buf(),
                source: e,
            });
        }
        info!("{} directory created successfully", store);
    }

    // Check if directory is readable
    match tokio::fs::read_dir(path).await {
        Ok(_) => {
            info!("{} directory is accessible: {:?}", store, path);
            Ok(())
        }
        Err(e) => {
            error!("{} directory is not accessible: {}", store, e);
            Err(StartupCheckError::DirectoryNotAccessible {
                store,
                path: path.to_path_buf(),
                source: e,
            })
        }
    }
}
