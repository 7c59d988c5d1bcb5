use thiserror::Error;

/// Client-fault errors raised while shaping a request into a resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for '{key}': {reason}")]
    InvalidOption { key: &'static str, reason: String },

    #[error("Conflicting values for '{key}'")]
    ConflictingOption { key: &'static str },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
}

impl ValidationError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidOption {
            key,
            reason: reason.into(),
        }
    }

    /// The option key at fault, when the error concerns a single option.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            ValidationError::InvalidOption { key, .. }
            | ValidationError::ConflictingOption { key } => Some(key),
            _ => None,
        }
    }
}
