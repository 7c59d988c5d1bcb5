use super::format::OutputFormat;
use super::formats;
use super::options::{Fit, Gravity, Options, Rotation};
use super::resource::Resource;
use async_trait::async_trait;
use axum::body::Bytes;
use image::{DynamicImage, imageops::FilterType};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Resource has no body to render")]
    EmptyBody,
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Encode error: {0}")]
    Encode(String),
}

/// Renders a loaded resource according to its options.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn render(&self, resource: &Resource) -> Result<Resource, TransformError>;
}

pub type DynTransformer = Arc<dyn Transformer>;

/// Decode, rotate, resize and re-encode using the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageTransformer {
    default_quality: u8,
}

impl ImageTransformer {
    pub fn new(default_quality: u8) -> Self {
        Self { default_quality }
    }
}

impl Default for ImageTransformer {
    fn default() -> Self {
        Self::new(85)
    }
}

#[async_trait]
impl Transformer for ImageTransformer {
    async fn render(&self, resource: &Resource) -> Result<Resource, TransformError> {
        let body = resource.body().cloned().ok_or(TransformError::EmptyBody)?;
        let options = resource.options().clone();
        let default_quality = self.default_quality;

        // Process image in blocking thread
        let rendered = tokio::task::spawn_blocking(move || {
            render_bytes(&body, &options, default_quality)
        })
        .await??;

        Ok(resource.with_body(rendered))
    }
}

/// Applies `options` to an encoded image.
///
/// Identity options on a source already in a servable format return the
/// source bytes untouched.
pub fn render_bytes(
    body: &Bytes,
    options: &Options,
    default_quality: u8,
) -> Result<Bytes, TransformError> {
    let source_format = image::guess_format(body).ok();
    let servable = source_format.and_then(OutputFormat::from_image_format);

    if options.is_identity() && servable.is_some() {
        debug!("Identity options, serving source bytes as-is");
        return Ok(body.clone());
    }

    let output_format = options
        .format()
        .or(servable)
        .unwrap_or(OutputFormat::Jpeg);
    let icc_profile = source_format.and_then(|format| formats::extract_icc_profile(body, format));

    let img = image::load_from_memory(body)?;
    let rotated = rotate(img, options.rotate());
    let resized = resize_image(rotated, options);

    debug!(
        "Rendered {}x{} as {}",
        resized.width(),
        resized.height(),
        output_format.as_str()
    );

    let quality = options.quality().unwrap_or(default_quality);
    let encoded = formats::encode(&resized, output_format, quality, icc_profile.as_deref())?;
    Ok(Bytes::from(encoded))
}

fn rotate(img: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::None => img,
        Rotation::Deg90 => img.rotate90(),
        Rotation::Deg180 => img.rotate180(),
        Rotation::Deg270 => img.rotate270(),
    }
}

fn resize_image(img: DynamicImage, options: &Options) -> DynamicImage {
    let (orig_width, orig_height) = (img.width(), img.height());

    match (options.width(), options.height()) {
        (None, None) => img,
        (Some(width), Some(height)) => match options.fit() {
            Fit::Fill => img.resize_exact(width, height, FilterType::Lanczos3),
            Fit::Cover => cover(img, width, height, options.gravity()),
            Fit::Contain => contain(img, width, height),
        },
        (Some(width), None) => contain(img, width, orig_height),
        (None, Some(height)) => contain(img, orig_width, height),
    }
}

/// Fits inside the box keeping aspect ratio. Never upscales.
fn contain(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    if img.width() <= max_width && img.height() <= max_height {
        return img;
    }
    img.resize(max_width, max_height, FilterType::Lanczos3)
}

/// Scales to cover the box, then crops the overflow around `gravity`.
fn cover(img: DynamicImage, width: u32, height: u32, gravity: Gravity) -> DynamicImage {
    let (orig_width, orig_height) = (img.width() as f64, img.height() as f64);
    let scale = (width as f64 / orig_width).max(height as f64 / orig_height);
    let scaled_width = ((orig_width * scale).ceil() as u32).max(width);
    let scaled_height = ((orig_height * scale).ceil() as u32).max(height);

    let scaled = img.resize_exact(scaled_width, scaled_height, FilterType::Lanczos3);

    let (anchor_x, anchor_y) = gravity.anchor();
    let x = ((scaled_width - width) as f32 * anchor_x).round() as u32;
    let y = ((scaled_height - height) as f32 * anchor_y).round() as u32;
    scaled.crop_imm(x, y, width, height)
}
