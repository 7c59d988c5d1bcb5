use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use image::{DynamicImage, ImageFormat, RgbImage};
use rendition::auth::create_signed_token;
use rendition::image::{ImageTransformer, Resource};
use rendition::metrics::InMemoryMetrics;
use rendition::pipeline::ImagePipeline;
use rendition::provider::memory::{MemoryCacheProvider, MemorySourceProvider};
use rendition::provider::{CacheProvider, ProviderError, SourceProvider};
use rendition::{AppState, Config, router};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const SECRET: &str = "integration-secret";

fn disk_fault() -> ProviderError {
    std::io::Error::other("disk unavailable").into()
}

/// Memory source that counts every call.
#[derive(Default)]
struct CountingSource {
    inner: MemorySourceProvider,
    calls: AtomicUsize,
    fail_get: AtomicBool,
}

#[async_trait]
impl SourceProvider for CountingSource {
    async fn get(&self, resource: &Resource) -> Result<Resource, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(disk_fault());
        }
        self.inner.get(resource).await
    }

    async fn set(&self, resource: &Resource) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set(resource).await
    }

    async fn del(&self, resource: &Resource) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.del(resource).await
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Memory cache that counts every call.
#[derive(Default)]
struct CountingCache {
    inner: MemoryCacheProvider,
    calls: AtomicUsize,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
}

#[async_trait]
impl CacheProvider for CountingCache {
    async fn get(&self, resource: &Resource) -> Result<Resource, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(disk_fault());
        }
        self.inner.get(resource).await
    }

    async fn set(&self, resource: &Resource) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(disk_fault());
        }
        self.inner.set(resource).await
    }

    async fn del(&self, resource: &Resource) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.del(resource).await
    }

    fn name(&self) -> &str {
        "counting"
    }
}

struct Harness {
    server: TestServer,
    state: AppState,
    source: Arc<CountingSource>,
    cache: Arc<CountingCache>,
    metrics: Arc<InMemoryMetrics>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        config.auth.secret = SECRET.to_string();
        configure(&mut config);

        let source = Arc::new(CountingSource::default());
        let cache = Arc::new(CountingCache::default());
        let metrics = Arc::new(InMemoryMetrics::new());
        let pipeline = ImagePipeline::new(
            source.clone(),
            cache.clone(),
            Arc::new(ImageTransformer::new(config.image.render.default_quality)),
            metrics.clone(),
        )
        .with_coalescing(config.image.render.coalesce);
        let authorizer = rendition::auth::create_authorizer(&config.auth);

        let state = AppState::new(config, pipeline, authorizer);
        let server = TestServer::new(router(state.clone())).unwrap();

        Self {
            server,
            state,
            source,
            cache,
            metrics,
        }
    }

    fn provider_calls(&self) -> usize {
        self.source.calls.load(Ordering::SeqCst) + self.cache.calls.load(Ordering::SeqCst)
    }

    async fn settle(&self) {
        self.state.pipeline.wait_for_background().await;
    }

    async fn upload(&self, path: &str, body: Vec<u8>) -> axum_test::TestResponse {
        let token = create_signed_token(SECRET, "tests").unwrap();
        let form = MultipartForm::new().add_part(
            "image",
            Part::bytes(body).file_name("upload").mime_type("application/octet-stream"),
        );
        let response = self
            .server
            .post(path)
            .add_header(header::AUTHORIZATION, bearer(&token))
            .multipart(form)
            .await;
        self.settle().await;
        response
    }
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, format)
        .unwrap();
    buffer.into_inner()
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

fn dimensions(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).unwrap();
    (img.width(), img.height())
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new();
    let response = harness.server.get("/health").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let harness = Harness::new();
    harness
        .upload("/cat.jpg", jpeg(400, 300))
        .await
        .assert_status(StatusCode::CREATED);

    let first = harness
        .server
        .get("/cat.jpg")
        .add_query_param("width", 100)
        .await;
    first.assert_status_ok();
    assert_eq!(first.header("x-image-from"), "source");
    assert_eq!(first.header(header::CONTENT_TYPE), "image/jpeg");
    assert_eq!(dimensions(first.as_bytes()), (100, 75));

    harness.settle().await;

    let second = harness
        .server
        .get("/cat.jpg")
        .add_query_param("w", 100)
        .await;
    second.assert_status_ok();
    assert_eq!(second.header("x-image-from"), "cache");
    assert_eq!(first.as_bytes().to_vec(), second.as_bytes().to_vec());

    assert_eq!(harness.metrics.counter("cache_miss"), 1);
    assert_eq!(harness.metrics.counter("cache_hit"), 1);
}

#[tokio::test]
async fn test_upload_then_get_returns_identical_bytes() {
    let harness = Harness::new();
    let original = jpeg(64, 48);
    harness
        .upload("/albums/2024/cat.jpg", original.clone())
        .await
        .assert_status(StatusCode::CREATED);

    let response = harness.server.get("/albums/2024/cat.jpg").await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().to_vec(), original);
    assert_eq!(
        response.header(header::CONTENT_LENGTH),
        original.len().to_string().as_str()
    );
}

#[tokio::test]
async fn test_upload_receipt() {
    let harness = Harness::new();
    let body = jpeg(32, 32);

    let response = harness.upload("/cat.jpg", body.clone()).await;
    response.assert_status(StatusCode::CREATED);

    let json: serde_json::Value = response.json();
    assert_eq!(json["file"], "/cat.jpg");
    assert_eq!(json["size"], body.len());
    assert_eq!(json["type"], "image/jpeg");
    assert_eq!(json["hash"], format!("{:x}", md5::compute(&body)));
    assert_eq!(harness.metrics.counter("image_received_bytes"), body.len() as u64);
}

#[tokio::test]
async fn test_upload_invalidates_cached_variants() {
    let harness = Harness::new();
    harness.upload("/cat.jpg", jpeg(400, 300)).await;

    for width in [100, 200] {
        harness
            .server
            .get("/cat.jpg")
            .add_query_param("width", width)
            .await
            .assert_status_ok();
    }
    harness.settle().await;
    let cached = harness.server.get("/cat.jpg").add_query_param("width", 100).await;
    assert_eq!(cached.header("x-image-from"), "cache");

    harness.upload("/cat.jpg", jpeg(200, 200)).await;

    for width in [100, 200] {
        let response = harness
            .server
            .get("/cat.jpg")
            .add_query_param("width", width)
            .await;
        assert_eq!(response.header("x-image-from"), "source");
        assert_eq!(dimensions(response.as_bytes()), (width, width));
    }
}

#[tokio::test]
async fn test_unsupported_extension_touches_no_provider() {
    let harness = Harness::new();

    let response = harness.server.get("/cat.bmp").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let json: serde_json::Value = response.json();
    assert_eq!(json["error"]["type"], "validation_error");

    harness
        .server
        .get("/README")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let token = create_signed_token(SECRET, "tests").unwrap();
    harness
        .server
        .delete("/cat.bmp")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(harness.provider_calls(), 0);
}

#[tokio::test]
async fn test_extension_allow_list_is_configurable() {
    let harness = Harness::with_config(|config| {
        config.image.support.extensions =
            rendition::image::SupportedExtensions::new(["png"]).unwrap();
    });

    harness
        .server
        .get("/cat.jpg")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    harness
        .server
        .get("/cat.PNG")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_image_is_not_found() {
    let harness = Harness::new();
    let response = harness.server.get("/nope.jpg").add_query_param("width", 10).await;
    response.assert_status(StatusCode::NOT_FOUND);
    let json: serde_json::Value = response.json();
    assert_eq!(json["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_source_fault_is_not_found() {
    let harness = Harness::new();
    harness.upload("/cat.jpg", jpeg(40, 30)).await;
    harness.source.fail_get.store(true, Ordering::SeqCst);

    let response = harness.server.get("/cat.jpg").add_query_param("width", 10).await;
    response.assert_status(StatusCode::NOT_FOUND);
    let json: serde_json::Value = response.json();
    assert_eq!(json["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_cache_lookup_fault_is_a_miss() {
    let harness = Harness::new();
    harness.upload("/cat.jpg", jpeg(400, 300)).await;
    harness.server.get("/cat.jpg").add_query_param("width", 100).await;
    harness.settle().await;

    harness.cache.fail_get.store(true, Ordering::SeqCst);
    let response = harness.server.get("/cat.jpg").add_query_param("width", 100).await;
    response.assert_status_ok();
    assert_eq!(response.header("x-image-from"), "source");
    assert_eq!(dimensions(response.as_bytes()), (100, 75));
}

#[tokio::test]
async fn test_cache_store_fault_does_not_affect_response() {
    let harness = Harness::new();
    harness.upload("/cat.jpg", jpeg(400, 300)).await;
    harness.cache.fail_set.store(true, Ordering::SeqCst);

    for _ in 0..2 {
        let response = harness.server.get("/cat.jpg").add_query_param("width", 100).await;
        response.assert_status_ok();
        assert_eq!(response.header("x-image-from"), "source");
        assert_eq!(dimensions(response.as_bytes()), (100, 75));
        harness.settle().await;
    }
    assert_eq!(harness.metrics.counter("cache_hit"), 0);
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    let harness = Harness::new();
    harness.upload("/cat.jpg", jpeg(40, 40)).await;
    let calls = harness.provider_calls();

    for (key, value) in [("width", "abc"), ("quality", "0"), ("rotate", "45"), ("fit", "squash")] {
        harness
            .server
            .get("/cat.jpg")
            .add_query_param(key, value)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    harness
        .server
        .get("/cat.jpg?width=100&w=200")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(harness.provider_calls(), calls);
}

#[tokio::test]
async fn test_accept_negotiates_webp() {
    let harness = Harness::new();
    harness.upload("/cat.jpg", jpeg(40, 40)).await;

    let response = harness
        .server
        .get("/cat.jpg")
        .add_header(
            header::ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,*/*"),
        )
        .await;
    response.assert_status_ok();
    assert_eq!(response.header(header::CONTENT_TYPE), "image/webp");
    assert_eq!(
        response.header(header::VARY),
        "Accept, DPR, Viewport-Width, Width"
    );
    assert_eq!(response.header("accept-ch"), "DPR, Viewport-Width, Width");

    let explicit = harness
        .server
        .get("/cat.jpg")
        .add_query_param("format", "png")
        .add_header(header::ACCEPT, HeaderValue::from_static("image/webp"))
        .await;
    assert_eq!(explicit.header(header::CONTENT_TYPE), "image/png");
}

#[tokio::test]
async fn test_client_hints_size_the_image() {
    let harness = Harness::new();
    harness.upload("/cat.jpg", jpeg(400, 200)).await;

    let response = harness
        .server
        .get("/cat.jpg")
        .add_header(
            HeaderName::from_static("viewport-width"),
            HeaderValue::from_static("100"),
        )
        .add_header(HeaderName::from_static("dpr"), HeaderValue::from_static("2"))
        .await;
    response.assert_status_ok();
    assert_eq!(dimensions(response.as_bytes()), (200, 100));

    let explicit = harness
        .server
        .get("/cat.jpg")
        .add_query_param("width", 50)
        .add_header(HeaderName::from_static("width"), HeaderValue::from_static("300"))
        .await;
    assert_eq!(dimensions(explicit.as_bytes()), (50, 25));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let harness = Harness::new();
    harness.upload("/cat.jpg", jpeg(40, 40)).await;
    let token = create_signed_token(SECRET, "tests").unwrap();

    let response = harness
        .server
        .delete("/cat.jpg")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json, serde_json::json!({ "cache": true, "source": false }));

    harness.server.get("/cat.jpg").await.assert_status_ok();
    harness.settle().await;

    for _ in 0..2 {
        let response = harness
            .server
            .delete("/cat.jpg")
            .add_query_param("from", "source")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status_ok();
        let json: serde_json::Value = response.json();
        assert_eq!(json, serde_json::json!({ "cache": true, "source": true }));
    }

    harness
        .server
        .get("/cat.jpg")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    harness
        .server
        .delete("/cat.jpg")
        .add_query_param("from", "everywhere")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mutations_require_authorization() {
    let harness = Harness::new();
    let form = || {
        MultipartForm::new().add_part("image", Part::bytes(jpeg(8, 8)).file_name("cat.jpg"))
    };

    harness
        .server
        .post("/cat.jpg")
        .multipart(form())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let forged = create_signed_token("wrong-secret", "tests").unwrap();
    harness
        .server
        .post("/cat.jpg")
        .add_header(header::AUTHORIZATION, bearer(&forged))
        .multipart(form())
        .await
        .assert_status(StatusCode::FORBIDDEN);

    harness
        .server
        .delete("/cat.jpg")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    assert_eq!(harness.provider_calls(), 0);
}

#[tokio::test]
async fn test_disabled_auth_allows_mutations() {
    let harness = Harness::with_config(|config| config.auth.enabled = false);
    harness
        .server
        .post("/cat.jpg")
        .multipart(
            MultipartForm::new().add_part("image", Part::bytes(jpeg(8, 8)).file_name("cat.jpg")),
        )
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_bad_uploads() {
    let harness = Harness::with_config(|config| config.image.max_upload_size = 1024);

    let response = harness.upload("/cat.jpg", b"plain text, not an image".to_vec()).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = harness.upload("/cat.jpg", jpeg(256, 256)).await;
    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);

    let token = create_signed_token(SECRET, "tests").unwrap();
    harness
        .server
        .post("/cat.jpg")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .multipart(MultipartForm::new().add_text("caption", "no image here"))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert!(harness.source.inner.is_empty().await);
}
