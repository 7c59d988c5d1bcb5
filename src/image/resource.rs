use super::error::ValidationError;
use super::format::detect_content_type;
use super::options::Options;
use axum::body::Bytes;
use sha2::{Digest, Sha256};
use std::fmt;

/// Normalized logical identifier of an image.
///
/// Percent-decoded, without leading, trailing or repeated slashes, never
/// empty and free of `.`/`..` segments, so it is safe to join onto a
/// filesystem root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImagePath(String);

impl ImagePath {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let decoded = urlencoding::decode(raw)
            .map_err(|_| ValidationError::InvalidPath(raw.to_string()))?;

        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" => continue,
                "." | ".." => return Err(ValidationError::InvalidPath(raw.to_string())),
                s if s.contains('\\') || s.contains('\0') => {
                    return Err(ValidationError::InvalidPath(raw.to_string()));
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(ValidationError::InvalidPath(raw.to_string()));
        }

        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Lower-cased extension of the last segment, if any.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(self.file_name())
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ImagePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An image in flight: what was asked for, and once loaded, its bytes.
///
/// A resource never changes its body in place; loading or rendering returns
/// a new value through [`Resource::with_body`].
#[derive(Debug, Clone)]
pub struct Resource {
    path: ImagePath,
    options: Options,
    body: Option<Bytes>,
    content_type: Option<&'static str>,
}

impl Resource {
    pub fn new(path: ImagePath, options: Options) -> Self {
        Self {
            path,
            options,
            body: None,
            content_type: None,
        }
    }

    /// Same path and options carrying `body`, with the content type sniffed
    /// from the bytes.
    pub fn with_body(&self, body: Bytes) -> Self {
        let content_type = detect_content_type(&body);
        Self {
            path: self.path.clone(),
            options: self.options.clone(),
            body: Some(body),
            content_type: Some(content_type),
        }
    }

    pub fn path(&self) -> &ImagePath {
        &self.path
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.content_type
    }

    pub fn size(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }

    /// Hash of the path alone; groups every cached variant of one source.
    pub fn path_key(&self) -> String {
        generate_cache_key(self.path.as_str(), None)
    }

    /// Hash of path and canonical options; addresses one rendered variant.
    pub fn variant_key(&self) -> String {
        generate_cache_key(self.path.as_str(), Some(&self.options.canonical()))
    }
}

fn generate_cache_key(path: &str, options: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path);
    if let Some(options) = options {
        hasher.update("?");
        hasher.update(options);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::OptionParser;
    use axum::http::HeaderMap;

    #[test]
    fn test_path_normalization() {
        assert_eq!(ImagePath::parse("/cat.jpg").unwrap().as_str(), "cat.jpg");
        assert_eq!(
            ImagePath::parse("//albums///2024/cat.jpg/").unwrap().as_str(),
            "albums/2024/cat.jpg"
        );
        assert_eq!(
            ImagePath::parse("/my%20cat.jpg").unwrap().as_str(),
            "my cat.jpg"
        );
    }

    #[test]
    fn test_path_rejects_traversal_and_empty() {
        for raw in ["/", "", "/../etc/passwd.jpg", "/a/./b.jpg", "/%2e%2e/x.jpg", "/a\\b.jpg"] {
            assert!(ImagePath::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_path_extension() {
        let path = ImagePath::parse("/albums/Cat.JPG").unwrap();
        assert_eq!(path.extension().as_deref(), Some("jpg"));
        assert_eq!(path.file_name(), "Cat.JPG");

        let path = ImagePath::parse("/albums.v2/readme").unwrap();
        assert_eq!(path.extension(), None);
    }

    #[test]
    fn test_with_body_creates_new_value() {
        let path = ImagePath::parse("/cat.png").unwrap();
        let empty = Resource::new(path, Options::default());
        let loaded = empty.with_body(Bytes::from_static(b"\x89PNG\r\n\x1a\n\0\0\0\0"));

        assert!(empty.body().is_none());
        assert_eq!(empty.size(), 0);
        assert_eq!(loaded.size(), 12);
        assert_eq!(loaded.content_type(), Some("image/png"));
        assert_eq!(loaded.path(), empty.path());
    }

    #[test]
    fn test_variant_keys_follow_canonical_options() {
        let parser = OptionParser::default();
        let path = ImagePath::parse("/cat.jpg").unwrap();
        let a = Resource::new(
            path.clone(),
            parser.parse("width=100&height=50", &HeaderMap::new()).unwrap(),
        );
        let b = Resource::new(
            path.clone(),
            parser.parse("h=50&w=100&fit=contain", &HeaderMap::new()).unwrap(),
        );
        let c = Resource::new(path, parser.parse("width=101", &HeaderMap::new()).unwrap());

        assert_eq!(a.variant_key(), b.variant_key());
        assert_ne!(a.variant_key(), c.variant_key());
        assert_eq!(a.path_key(), c.path_key());
        assert_ne!(a.path_key(), a.variant_key());
    }
}
