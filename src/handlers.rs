use crate::AppState;
use crate::error::ImageApiError;
use crate::image::{ImagePath, Resource, ValidationError, format::OCTET_STREAM};
use crate::middleware::ResolvedOptions;
use crate::pipeline::{DeleteOutcome, DeleteTarget, IngestReceipt, Origin};
use axum::{
    Extension, Json,
    body::Body,
    extract::{
        Query, State,
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::QueryRejection,
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub const X_IMAGE_FROM: &str = "x-image-from";
const VARY_HINTS: &str = "Accept, DPR, Viewport-Width, Width";
const ACCEPT_CH: &str = "DPR, Viewport-Width, Width";
const CACHE_CONTROL: &str = "public, max-age=86400";
const UPLOAD_FIELD: &str = "image";

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn get_image(
    State(state): State<AppState>,
    Extension(path): Extension<ImagePath>,
    ResolvedOptions(options): ResolvedOptions,
) -> Result<Response, ImageApiError> {
    let resolved = state.pipeline.resolve(Resource::new(path, options)).await?;
    let resource = resolved.resource;
    let body = resource.body().cloned().ok_or_else(|| {
        ImageApiError::Internal(format!("{} resolved without a body", resource.path()))
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(resource.content_type().unwrap_or(OCTET_STREAM)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    headers.insert(
        HeaderName::from_static(X_IMAGE_FROM),
        HeaderValue::from_static(resolved.origin.as_str()),
    );
    headers.insert(header::VARY, HeaderValue::from_static(VARY_HINTS));
    headers.insert(
        HeaderName::from_static("accept-ch"),
        HeaderValue::from_static(ACCEPT_CH),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));

    let response = (StatusCode::OK, headers, Body::from(body)).into_response();

    if resolved.origin == Origin::Source {
        state.pipeline.cache_in_background(resource, resolved.generation);
    }

    Ok(response)
}

pub async fn post_image(
    State(state): State<AppState>,
    Extension(path): Extension<ImagePath>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<IngestReceipt>), ImageApiError> {
    let limit = state.config.image.max_upload_size;
    let mut multipart =
        multipart.map_err(|e| ValidationError::InvalidUpload(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        if data.len() > limit {
            return Err(ImageApiError::PayloadTooLarge { limit });
        }

        let receipt = state.pipeline.ingest(path, data).await?;
        return Ok((StatusCode::CREATED, Json(receipt)));
    }

    Err(ValidationError::InvalidUpload(format!("missing multipart field '{}'", UPLOAD_FIELD)).into())
}

fn multipart_error(error: MultipartError, limit: usize) -> ImageApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ImageApiError::PayloadTooLarge { limit }
    } else {
        ValidationError::InvalidUpload(error.body_text()).into()
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    from: Option<DeleteTarget>,
}

pub async fn delete_image(
    State(state): State<AppState>,
    Extension(path): Extension<ImagePath>,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> Result<Json<DeleteOutcome>, ImageApiError> {
    let Query(query) = query.map_err(|_| {
        ValidationError::InvalidOption {
            key: "from",
            reason: "expected 'cache' or 'source'".to_string(),
        }
    })?;

    let outcome = state
        .pipeline
        .evict(path, query.from.unwrap_or_default())
        .await;
    Ok(Json(outcome))
}
