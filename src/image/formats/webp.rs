use image::DynamicImage;

use crate::image::transform::TransformError;

/// Encode as lossy WebP, keeping the alpha channel when the source has one
pub fn encode(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, TransformError> {
    let encoded = if image.color().has_alpha() {
        let rgba_image = image.to_rgba8();
        let (width, height) = rgba_image.dimensions();
        webp::Encoder::from_rgba(rgba_image.as_raw(), width, height).encode(quality as f32)
    } else {
        let rgb_image = image.to_rgb8();
        let (width, height) = rgb_image.dimensions();
        webp::Encoder::from_rgb(rgb_image.as_raw(), width, height).encode(quality as f32)
    };

    if encoded.is_empty() {
        return Err(TransformError::Encode("webp encoder produced no data".to_string()));
    }

    Ok(encoded.to_vec())
}
