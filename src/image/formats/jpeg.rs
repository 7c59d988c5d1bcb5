use image::{DynamicImage, ImageEncoder, codecs::jpeg::JpegEncoder};
use tracing::debug;

use crate::image::transform::TransformError;

/// Extract ICC profile from JPEG bytes
///
/// Walks the marker segments between SOI and the first scan; bytes inside
/// other segments or entropy-coded data are never read as markers.
pub fn extract_icc_profile(buffer: &[u8]) -> Option<Vec<u8>> {
    if !buffer.starts_with(&[0xFF, 0xD8]) {
        return None;
    }

    let mut pos = 2;
    while let Some(&[0xFF, marker]) = buffer.get(pos..pos + 2) {
        match marker {
            // Fill byte before a marker
            0xFF => {
                pos += 1;
                continue;
            }
            // Start of scan or end of image: no metadata follows
            0xD9 | 0xDA => return None,
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let length = buffer
            .get(pos + 2..pos + 4)
            .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]) as usize)?;
        if length < 2 {
            debug!("Malformed JPEG segment length {} at offset {}", length, pos);
            return None;
        }
        let segment = buffer.get(pos + 4..pos + 2 + length)?;

        // ICC profiles live in APP2 segments; the identifier is followed by
        // sequence number and chunk count
        if marker == 0xE2 && segment.len() > 14 && segment.starts_with(b"ICC_PROFILE\0") {
            let icc_data = &segment[14..];
            debug!("Found ICC profile in JPEG: {} bytes", icc_data.len());
            return Some(icc_data.to_vec());
        }
        pos += 2 + length;
    }

    None
}

/// Encode as JPEG, embedding the ICC profile when the encoder accepts it
pub fn encode(
    image: &DynamicImage,
    quality: u8,
    icc_profile: Option<&[u8]>,
) -> Result<Vec<u8>, TransformError> {
    // JPEG doesn't support alpha channel, so convert to RGB
    let rgb_image = image.to_rgb8();
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);

    if let Some(profile_data) = icc_profile {
        match encoder.set_icc_profile(profile_data.to_vec()) {
            Ok(()) => debug!("Embedding ICC profile: {} bytes", profile_data.len()),
            Err(e) => debug!("Encoder rejected ICC profile ({}), writing without it", e),
        }
    }

    encoder.write_image(
        rgb_image.as_raw(),
        rgb_image.width(),
        rgb_image.height(),
        image::ExtendedColorType::Rgb8,
    )?;

    Ok(output)
}
