pub mod jpeg;
pub mod png;
pub mod webp;

use super::format::OutputFormat;
use super::transform::TransformError;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Pulls an embedded colour profile out of a source payload, for the formats
/// that carry one.
pub fn extract_icc_profile(buffer: &[u8], format: ImageFormat) -> Option<Vec<u8>> {
    match format {
        ImageFormat::Jpeg => jpeg::extract_icc_profile(buffer),
        ImageFormat::Png => png::extract_icc_profile(buffer),
        _ => None,
    }
}

/// Encodes `image` in the requested output format.
pub fn encode(
    image: &DynamicImage,
    format: OutputFormat,
    quality: u8,
    icc_profile: Option<&[u8]>,
) -> Result<Vec<u8>, TransformError> {
    match format {
        OutputFormat::Jpeg => jpeg::encode(image, quality, icc_profile),
        OutputFormat::Png => png::encode(image, icc_profile),
        OutputFormat::WebP => webp::encode(image, quality),
        OutputFormat::Gif => {
            let mut output = Cursor::new(Vec::new());
            image.to_rgba8().write_to(&mut output, ImageFormat::Gif)?;
            Ok(output.into_inner())
        }
    }
}
