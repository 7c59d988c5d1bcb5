use image::ImageFormat;

/// Encodings the transform engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            "gif" => Some(OutputFormat::Gif),
            _ => None,
        }
    }

    /// Maps a decoded source format onto an output format, when the source
    /// can be served as-is.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::WebP => Some(OutputFormat::WebP),
            ImageFormat::Gif => Some(OutputFormat::Gif),
            _ => None,
        }
    }

    /// Canonical option value, as it appears in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Gif => "gif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Gif => "gif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Gif => "image/gif",
        }
    }
}

/// Source formats the decoder accepts.
const DECODABLE_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
];

/// Signatures the image decoder does not recognise, checked when its own
/// sniffing is inconclusive. Entries are (offset, magic, mime).
///
/// None of these can be decoded, so they never make an upload acceptable;
/// they only let a rejection name what was actually sent.
const MAGIC_NUMBERS: &[(usize, &[u8], &str)] = &[
    (0, b"%PDF-", "application/pdf"),
    (0, b"8BPS", "image/vnd.adobe.photoshop"),
    (4, b"ftypheic", "image/heic"),
    (4, b"ftypheix", "image/heic"),
    (4, b"ftypmif1", "image/heif"),
    (0, b"\x00\x00\x00\x0cjP  \r\n\x87\n", "image/jp2"),
    (0, b"<svg", "image/svg+xml"),
];

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Detects the MIME type of a payload from its bytes.
///
/// The decoder's own format guess is tried first; when it cannot place the
/// payload, a table of magic numbers is consulted before giving up with
/// `application/octet-stream`.
pub fn detect_content_type(bytes: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type();
    }

    sniff_magic_number(bytes).unwrap_or(OCTET_STREAM)
}

fn sniff_magic_number(bytes: &[u8]) -> Option<&'static str> {
    let found = MAGIC_NUMBERS.iter().find(|(offset, magic, _)| {
        bytes
            .get(*offset..*offset + magic.len())
            .is_some_and(|window| window == *magic)
    });
    if let Some((_, _, mime)) = found {
        return Some(mime);
    }

    // SVG documents usually open with an XML prolog or a comment
    let head = &bytes[..bytes.len().min(512)];
    let head = String::from_utf8_lossy(head);
    if head.trim_start().starts_with('<') && head.contains("<svg") {
        return Some("image/svg+xml");
    }

    None
}

/// Returns the subtype of a MIME string: `image/jpeg` gives `jpeg`,
/// parameters are dropped and a string without `/` gives an empty subtype.
pub fn extract_image_type_from_mime(mime: &str) -> &str {
    match mime.split_once('/') {
        Some((_, subtype)) => subtype.split(';').next().unwrap_or_default().trim(),
        None => "",
    }
}

/// Resolves a format name (`jpeg`, `png`, `tiff`, ...) to a decoder format.
pub fn image_format_from_name(name: &str) -> Option<ImageFormat> {
    if name.is_empty() {
        return None;
    }
    ImageFormat::from_extension(name.to_ascii_lowercase())
}

/// Whether a MIME type names an image this service can decode.
pub fn is_image_mime_type_supported(mime: &str) -> bool {
    let lower = mime.to_ascii_lowercase();
    if !lower.starts_with("image/") {
        return false;
    }

    image_format_from_name(extract_image_type_from_mime(&lower))
        .is_some_and(|format| DECODABLE_FORMATS.contains(&format))
}
