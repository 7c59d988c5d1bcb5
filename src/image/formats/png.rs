use flate2::read::ZlibDecoder;
use image::{DynamicImage, ImageEncoder, codecs::png::PngEncoder};
use std::io::Read;
use tracing::debug;

use crate::image::transform::TransformError;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Extract ICC profile from PNG bytes
pub fn extract_icc_profile(buffer: &[u8]) -> Option<Vec<u8>> {
    if !buffer.starts_with(PNG_SIGNATURE) {
        return None;
    }

    let mut pos = PNG_SIGNATURE.len();

    while pos + 12 <= buffer.len() {
        let chunk_length = u32::from_be_bytes([
            buffer[pos],
            buffer[pos + 1],
            buffer[pos + 2],
            buffer[pos + 3],
        ]) as usize;
        let chunk_type = &buffer[pos + 4..pos + 8];
        let data_start = pos + 8;
        let data_end = data_start.saturating_add(chunk_length);

        // iCCP: name, NUL, compression method, compressed profile
        if chunk_type == b"iCCP" && data_end <= buffer.len() {
            let chunk_data = &buffer[data_start..data_end];
            if let Some(null_pos) = chunk_data.iter().position(|&b| b == 0)
                && null_pos + 2 < chunk_data.len()
                && chunk_data[null_pos + 1] == 0
            {
                let mut decoder = ZlibDecoder::new(&chunk_data[null_pos + 2..]);
                let mut decompressed = Vec::new();
                if decoder.read_to_end(&mut decompressed).is_ok() {
                    debug!(
                        "Found ICC profile in PNG: {} bytes (decompressed)",
                        decompressed.len()
                    );
                    return Some(decompressed);
                }
            }
        }

        if chunk_type == b"IEND" {
            break;
        }
        // length + type + data + CRC
        pos = data_end.saturating_add(4);
    }

    None
}

/// Encode as PNG, carrying the ICC profile across when present
pub fn encode(image: &DynamicImage, icc_profile: Option<&[u8]>) -> Result<Vec<u8>, TransformError> {
    let mut output = Vec::new();
    let mut encoder = PngEncoder::new(&mut output);

    if let Some(profile_data) = icc_profile
        && let Err(e) = encoder.set_icc_profile(profile_data.to_vec())
    {
        debug!("Encoder rejected ICC profile ({}), writing without it", e);
    }

    image.write_with_encoder(encoder)?;
    Ok(output)
}
