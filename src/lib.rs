use serde::{Deserialize, Serialize};

pub mod auth;
pub mod error;
pub mod handlers;
pub mod image;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod provider;
pub mod startup_checks;

use crate::auth::{AuthConfig, DynAuthorizer};
use crate::image::{ImageTransformer, OptionParser, ParserLimits, SupportedExtensions};
use crate::metrics::{DynMetrics, TracingMetrics};
use crate::pipeline::ImagePipeline;
use crate::provider::{CacheProviderConfig, SourceProviderConfig};

/// Room for multipart boundaries and part headers on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Rendition".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Largest accepted upload, in bytes.
    pub max_upload_size: usize,
    pub source: SourceProviderConfig,
    pub cache: CacheProviderConfig,
    pub support: SupportConfig,
    pub render: RenderConfig,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 32 * 1024 * 1024,
            source: SourceProviderConfig::default(),
            cache: CacheProviderConfig::default(),
            support: SupportConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SupportConfig {
    pub extensions: SupportedExtensions,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub default_quality: u8,
    /// Share one render between concurrent misses of the same variant.
    pub coalesce: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let limits = ParserLimits::default();
        Self {
            max_width: limits.max_width,
            max_height: limits.max_height,
            default_quality: limits.default_quality,
            coalesce: false,
        }
    }
}

impl RenderConfig {
    pub fn parser_limits(&self) -> ParserLimits {
        ParserLimits {
            max_width: self.max_width,
            max_height: self.max_height,
            default_quality: self.default_quality,
        }
    }
}

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub parser: OptionParser,
    pub pipeline: Arc<ImagePipeline>,
    pub authorizer: DynAuthorizer,
}

impl AppState {
    pub fn new(config: Config, pipeline: ImagePipeline, authorizer: DynAuthorizer) -> Self {
        let parser = OptionParser::new(config.image.render.parser_limits());
        Self {
            config: Arc::new(config),
            parser,
            pipeline: Arc::new(pipeline),
            authorizer,
        }
    }

    /// Builds providers, transformer, metrics and authorizer from `config`.
    pub fn from_config(config: Config) -> Self {
        let metrics: DynMetrics = Arc::new(TracingMetrics);
        let source = provider::create_source_provider(&config.image.source);
        let cache = provider::create_cache_provider(&config.image.cache);
        tracing::info!(
            "Using {} source provider and {} cache provider",
            source.name(),
            cache.name()
        );
        let pipeline = ImagePipeline::new(
            source,
            cache,
            Arc::new(ImageTransformer::new(config.image.render.default_quality)),
            metrics,
        )
        .with_coalescing(config.image.render.coalesce);
        let authorizer = auth::create_authorizer(&config.auth);

        Self::new(config, pipeline, authorizer)
    }
}

pub async fn create_app(config: Config) -> Router {
    router(AppState::from_config(config))
}

pub fn router(app_state: AppState) -> Router {
    let public = ServiceBuilder::new()
        .layer(from_fn(middleware::normalize_path))
        .layer(from_fn_with_state(
            app_state.clone(),
            middleware::filter_extension,
        ))
        .layer(from_fn_with_state(
            app_state.clone(),
            middleware::parse_options,
        ))
        .layer(from_fn_with_state(
            app_state.clone(),
            middleware::negotiate_content_type,
        ))
        .layer(from_fn_with_state(
            app_state.clone(),
            middleware::adapt_client_hints,
        ));

    let private = ServiceBuilder::new()
        .layer(from_fn(middleware::normalize_path))
        .layer(from_fn_with_state(
            app_state.clone(),
            middleware::filter_extension,
        ))
        .layer(from_fn_with_state(app_state.clone(), middleware::authorize));

    let body_limit = app_state
        .config
        .image
        .max_upload_size
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/{*path}",
            get(handlers::get_image).layer(public).merge(
                post(handlers::post_image)
                    .delete(handlers::delete_image)
                    .layer(private),
            ),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let method = request.method();
                    let uri = request.uri();
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %method,
                        uri = %uri,
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let headers = request.headers();
                    let user_agent = headers
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");
                    let accept = headers
                        .get("accept")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %request.method(),
                        path = %request.uri().path(),
                        query = ?request.uri().query(),
                        user_agent = %user_agent,
                        accept = %accept,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let headers = response.headers();
                        let size = headers
                            .get("content-length")
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("-");
                        let from = headers
                            .get(handlers::X_IMAGE_FROM)
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("-");

                        tracing::info!(
                            target: "access_log",
                            status = %response.status(),
                            size = %size,
                            from = %from,
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state)
}
