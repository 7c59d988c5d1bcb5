use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Resource has no body to store: {0}")]
    EmptyBody(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    /// Maps `NotFound` io errors onto [`ProviderError::NotFound`] for `key`.
    pub(crate) fn from_io(err: std::io::Error, key: &str) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            ProviderError::NotFound(key.to_string())
        } else {
            ProviderError::Io(err)
        }
    }
}
