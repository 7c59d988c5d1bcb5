use super::format::OutputFormat;
use std::fmt;

/// How a resize fits the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Fit {
    /// Scale down to fit inside the box, keeping the aspect ratio
    #[default]
    Contain,
    /// Scale to cover the box, then crop the overflow around the gravity
    Cover,
    /// Stretch to exactly the box
    Fill,
}

impl Fit {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "contain" => Some(Fit::Contain),
            "cover" => Some(Fit::Cover),
            "fill" => Some(Fit::Fill),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Fit::Contain => "contain",
            Fit::Cover => "cover",
            Fit::Fill => "fill",
        }
    }
}

/// Anchor kept in frame when a cover crop discards pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gravity {
    #[default]
    Center,
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Gravity {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "center" | "centre" => Some(Gravity::Center),
            "north" => Some(Gravity::North),
            "south" => Some(Gravity::South),
            "east" => Some(Gravity::East),
            "west" => Some(Gravity::West),
            "northeast" => Some(Gravity::NorthEast),
            "northwest" => Some(Gravity::NorthWest),
            "southeast" => Some(Gravity::SouthEast),
            "southwest" => Some(Gravity::SouthWest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gravity::Center => "center",
            Gravity::North => "north",
            Gravity::South => "south",
            Gravity::East => "east",
            Gravity::West => "west",
            Gravity::NorthEast => "northeast",
            Gravity::NorthWest => "northwest",
            Gravity::SouthEast => "southeast",
            Gravity::SouthWest => "southwest",
        }
    }

    /// Horizontal and vertical anchor as fractions of the overflow.
    pub fn anchor(&self) -> (f32, f32) {
        match self {
            Gravity::Center => (0.5, 0.5),
            Gravity::North => (0.5, 0.0),
            Gravity::South => (0.5, 1.0),
            Gravity::East => (1.0, 0.5),
            Gravity::West => (0.0, 0.5),
            Gravity::NorthEast => (1.0, 0.0),
            Gravity::NorthWest => (0.0, 0.0),
            Gravity::SouthEast => (1.0, 1.0),
            Gravity::SouthWest => (0.0, 1.0),
        }
    }
}

/// Clockwise rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 | 360 => Some(Rotation::None),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

/// Options as read from the query string and client hints, before
/// canonicalization. Never used as a cache key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsDraft {
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
    pub(crate) quality: Option<u8>,
    pub(crate) format: Option<OutputFormat>,
    pub(crate) fit: Option<Fit>,
    pub(crate) gravity: Option<Gravity>,
    pub(crate) rotate: Option<Rotation>,
    pub(crate) dpr: Option<f32>,
}

/// Canonical transformation descriptor.
///
/// Only the option parser builds non-empty values, and it drops defaults
/// and folds the pixel ratio into the dimensions, so two semantically equal
/// requests compare equal and share one [`Options::canonical`] string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Options {
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
    pub(crate) quality: Option<u8>,
    pub(crate) format: Option<OutputFormat>,
    pub(crate) fit: Fit,
    pub(crate) gravity: Gravity,
    pub(crate) rotate: Rotation,
}

impl Options {
    pub fn width(&self) -> Option<u32> {
        self.width
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn quality(&self) -> Option<u8> {
        self.quality
    }

    pub fn format(&self) -> Option<OutputFormat> {
        self.format
    }

    pub fn fit(&self) -> Fit {
        self.fit
    }

    pub fn gravity(&self) -> Gravity {
        self.gravity
    }

    pub fn rotate(&self) -> Rotation {
        self.rotate
    }

    /// True when rendering would leave the source untouched.
    pub fn is_identity(&self) -> bool {
        *self == Options::default()
    }

    /// Non-default options as `(key, value)` pairs, sorted by key.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if self.fit != Fit::default() {
            pairs.push(("fit", self.fit.as_str().to_string()));
        }
        if let Some(format) = self.format {
            pairs.push(("format", format.as_str().to_string()));
        }
        if self.gravity != Gravity::default() {
            pairs.push(("gravity", self.gravity.as_str().to_string()));
        }
        if let Some(height) = self.height {
            pairs.push(("height", height.to_string()));
        }
        if let Some(quality) = self.quality {
            pairs.push(("quality", quality.to_string()));
        }
        if self.rotate != Rotation::default() {
            pairs.push(("rotate", self.rotate.degrees().to_string()));
        }
        if let Some(width) = self.width {
            pairs.push(("width", width.to_string()));
        }
        pairs
    }

    /// Deterministic `key=value&...` encoding used in cache keys.
    pub fn canonical(&self) -> String {
        self.pairs()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}
