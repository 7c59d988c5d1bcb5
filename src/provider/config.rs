use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum SourceProviderConfig {
    Fs(FsConfig),
    Memory,
}

impl Default for SourceProviderConfig {
    fn default() -> Self {
        SourceProviderConfig::Fs(FsConfig {
            path: PathBuf::from("/var/lib/rendition/source"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum CacheProviderConfig {
    Fs(FsConfig),
    Memory,
}

impl Default for CacheProviderConfig {
    fn default() -> Self {
        CacheProviderConfig::Fs(FsConfig {
            path: PathBuf::from("/var/lib/rendition/cache"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FsConfig {
    pub path: PathBuf,
}
