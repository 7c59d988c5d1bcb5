//! Request chain links. Each link either annotates the request extensions,
//! short-circuits with an error, or hands over to the next link.

use crate::AppState;
use crate::error::ImageApiError;
use crate::image::{ImagePath, Options, OptionsDraft, ValidationError};
use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Percent-decodes and normalizes the request path into an [`ImagePath`].
pub async fn normalize_path(mut request: Request, next: Next) -> Result<Response, ImageApiError> {
    let path = ImagePath::parse(request.uri().path())?;
    request.extensions_mut().insert(path);
    Ok(next.run(request).await)
}

/// Rejects paths whose extension is not in the configured allow-list.
pub async fn filter_extension(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ImageApiError> {
    let path = image_path(&request)?;
    let extension = path.extension().unwrap_or_default();

    if !state.config.image.support.extensions.contains(&extension) {
        debug!("Rejected {}: extension '{}' not supported", path, extension);
        return Err(ValidationError::UnsupportedExtension(extension).into());
    }

    Ok(next.run(request).await)
}

/// Reads explicit options from the query string into an [`OptionsDraft`].
pub async fn parse_options(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ImageApiError> {
    let draft = state
        .parser
        .parse_query(request.uri().query().unwrap_or_default())?;
    request.extensions_mut().insert(draft);
    Ok(next.run(request).await)
}

/// Picks an output format from `Accept` when none was requested.
pub async fn negotiate_content_type(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    if let Some(draft) = parts.extensions.get_mut::<OptionsDraft>() {
        state.parser.negotiate_format(draft, &parts.headers);
    }
    next.run(Request::from_parts(parts, body)).await
}

/// Sizes the image from client hints when no width was requested.
pub async fn adapt_client_hints(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    if let Some(draft) = parts.extensions.get_mut::<OptionsDraft>() {
        state.parser.apply_client_hints(draft, &parts.headers);
    }
    next.run(Request::from_parts(parts, body)).await
}

/// Gate for mutating routes.
pub async fn authorize(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ImageApiError> {
    state.authorizer.authorize(request.headers()).map_err(|e| {
        debug!("Unauthorized {} {}: {}", request.method(), request.uri(), e);
        e
    })?;
    Ok(next.run(request).await)
}

fn image_path(request: &Request<Body>) -> Result<&ImagePath, ImageApiError> {
    request
        .extensions()
        .get::<ImagePath>()
        .ok_or_else(|| ImageApiError::Internal("path was not normalized".to_string()))
}

/// Canonical options, finalized from the draft the chain left behind.
#[derive(Debug, Clone)]
pub struct ResolvedOptions(pub Options);

impl FromRequestParts<AppState> for ResolvedOptions {
    type Rejection = ImageApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let draft = parts
            .extensions
            .get::<OptionsDraft>()
            .cloned()
            .unwrap_or_default();
        Ok(ResolvedOptions(state.parser.finalize(draft)?))
    }
}
