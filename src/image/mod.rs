//! Image model: paths, options, content detection and rendering.

mod error;
pub mod extensions;
pub mod format;
pub mod formats;
mod options;
mod parser;
mod resource;
pub mod transform;

pub use error::ValidationError;
pub use extensions::SupportedExtensions;
pub use format::{OutputFormat, detect_content_type, is_image_mime_type_supported};
pub use options::{Fit, Gravity, Options, OptionsDraft, Rotation};
pub use parser::{OptionParser, ParserLimits};
pub use resource::{ImagePath, Resource};
pub use transform::{DynTransformer, ImageTransformer, TransformError, Transformer};
