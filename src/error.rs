//! Request-level error taxonomy and its HTTP mapping.

use crate::auth::AuthError;
use crate::image::{TransformError, ValidationError};
use crate::provider::ProviderError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Backend(#[source] ProviderError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("Internal error: {0}")]
    Internal(String),

    /// Failure of a render shared by several concurrent requests.
    #[error("{0}")]
    Coalesced(Arc<ImageApiError>),
}

impl ImageApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ImageApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ImageApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ImageApiError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ImageApiError::Transform(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ImageApiError::Auth(AuthError::MissingCredentials) => StatusCode::UNAUTHORIZED,
            ImageApiError::Auth(AuthError::InvalidCredentials) => StatusCode::FORBIDDEN,
            ImageApiError::Auth(AuthError::InvalidSecret) => StatusCode::INTERNAL_SERVER_ERROR,
            ImageApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ImageApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ImageApiError::Coalesced(inner) => inner.status(),
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ImageApiError::Validation(_) => "validation_error",
            ImageApiError::NotFound(_) => "not_found",
            ImageApiError::Backend(_) => "backend_error",
            ImageApiError::Transform(_) => "transform_error",
            ImageApiError::Auth(AuthError::MissingCredentials) => "unauthorized",
            ImageApiError::Auth(AuthError::InvalidCredentials) => "forbidden",
            ImageApiError::Auth(AuthError::InvalidSecret) => "internal_error",
            ImageApiError::PayloadTooLarge { .. } => "payload_too_large",
            ImageApiError::Internal(_) => "internal_error",
            ImageApiError::Coalesced(inner) => inner.error_type(),
        }
    }
}

impl IntoResponse for ImageApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Server faults are already logged where detected; keep details out
        // of the response body.
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
