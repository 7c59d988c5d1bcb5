use super::error::ValidationError;
use super::format::OutputFormat;
use super::options::{Fit, Gravity, Options, OptionsDraft, Rotation};
use axum::http::HeaderMap;
use std::collections::BTreeMap;
use tracing::debug;

const MIN_DPR: f32 = 1.0;
const MAX_DPR: f32 = 5.0;

/// Query keys the parser understands, with their accepted aliases.
const RECOGNIZED_KEYS: &[(&str, &[&str])] = &[
    ("width", &["width", "w"]),
    ("height", &["height", "h"]),
    ("quality", &["quality", "q"]),
    ("format", &["format", "fm"]),
    ("fit", &["fit", "crop"]),
    ("gravity", &["gravity", "g"]),
    ("rotate", &["rotate", "r"]),
    ("dpr", &["dpr"]),
];

const WIDTH_HINTS: &[&str] = &["sec-ch-width", "width"];
const VIEWPORT_WIDTH_HINTS: &[&str] = &["sec-ch-viewport-width", "viewport-width"];
const DPR_HINTS: &[&str] = &["sec-ch-dpr", "dpr"];

/// Bounds applied while validating and canonicalizing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub default_quality: u8,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_width: 8192,
            max_height: 8192,
            default_quality: 85,
        }
    }
}

/// Turns query parameters and headers into canonical [`Options`].
///
/// The stages are exposed separately so the middleware chain can run them as
/// independent links; [`OptionParser::parse`] runs them all in order.
#[derive(Debug, Clone, Default)]
pub struct OptionParser {
    limits: ParserLimits,
}

impl OptionParser {
    pub fn new(limits: ParserLimits) -> Self {
        Self { limits }
    }

    pub fn parse(&self, raw_query: &str, headers: &HeaderMap) -> Result<Options, ValidationError> {
        let mut draft = self.parse_query(raw_query)?;
        self.negotiate_format(&mut draft, headers);
        self.apply_client_hints(&mut draft, headers);
        self.finalize(draft)
    }

    /// Reads explicit options from a raw query string. Unknown keys are
    /// ignored; a recognized key given twice with different values is
    /// rejected.
    pub fn parse_query(&self, raw_query: &str) -> Result<OptionsDraft, ValidationError> {
        let mut values: BTreeMap<&'static str, String> = BTreeMap::new();

        for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
            let Some(key) = canonical_key(&key) else {
                continue;
            };
            let value = value.trim().to_string();
            match values.get(key) {
                Some(existing) if *existing != value => {
                    return Err(ValidationError::ConflictingOption { key });
                }
                Some(_) => {}
                None => {
                    values.insert(key, value);
                }
            }
        }

        let mut draft = OptionsDraft::default();
        for (key, value) in values {
            let value = value.as_str();
            match key {
                "width" => draft.width = Some(parse_dimension(key, value, self.limits.max_width)?),
                "height" => {
                    draft.height = Some(parse_dimension(key, value, self.limits.max_height)?)
                }
                "quality" => draft.quality = Some(parse_quality(value)?),
                "format" => {
                    draft.format = Some(OutputFormat::from_name(value).ok_or_else(|| {
                        ValidationError::invalid(key, format!("unsupported format '{}'", value))
                    })?)
                }
                "fit" => {
                    draft.fit = Some(Fit::from_name(value).ok_or_else(|| {
                        ValidationError::invalid(key, format!("unknown fit mode '{}'", value))
                    })?)
                }
                "gravity" => {
                    draft.gravity = Some(Gravity::from_name(value).ok_or_else(|| {
                        ValidationError::invalid(key, format!("unknown gravity '{}'", value))
                    })?)
                }
                "rotate" => draft.rotate = Some(parse_rotation(value)?),
                "dpr" => draft.dpr = Some(parse_dpr(value)?),
                _ => {}
            }
        }

        Ok(draft)
    }

    /// Picks WebP when the client advertises it and no format was requested.
    pub fn negotiate_format(&self, draft: &mut OptionsDraft, headers: &HeaderMap) {
        if draft.format.is_some() {
            return;
        }

        let Some(accept) = header_value(headers, &["accept"]) else {
            return;
        };

        if accepts_media_type(accept, "image/webp") {
            debug!("Negotiated webp output from Accept header");
            draft.format = Some(OutputFormat::WebP);
        }
    }

    /// Fills the width from client hints when the query left it open.
    /// Hints are advisory: unusable values are skipped, never rejected.
    pub fn apply_client_hints(&self, draft: &mut OptionsDraft, headers: &HeaderMap) {
        if draft.width.is_some() {
            return;
        }

        let max_width = self.limits.max_width;

        // Width is already expressed in physical pixels
        if let Some(width) = hint_u32(headers, WIDTH_HINTS, max_width) {
            draft.width = Some(width);
            return;
        }

        let Some(viewport_width) = hint_u32(headers, VIEWPORT_WIDTH_HINTS, max_width) else {
            return;
        };

        // A query dpr is folded in later by `finalize`; the DPR hint only
        // ever scales the viewport width.
        let dpr = match draft.dpr {
            Some(dpr) => dpr,
            None => dpr_hint(headers).unwrap_or(MIN_DPR),
        };
        let scaled = (viewport_width as f32 * dpr).round();
        if scaled > max_width as f32 {
            debug!(
                "Ignoring viewport hint {} at dpr {}: exceeds {}",
                viewport_width, dpr, max_width
            );
            return;
        }

        draft.width = Some(if draft.dpr.is_some() {
            viewport_width
        } else {
            scaled as u32
        });
    }

    /// Resolves a draft into canonical options: the pixel ratio is folded
    /// into the dimensions and every default value is dropped.
    pub fn finalize(&self, draft: OptionsDraft) -> Result<Options, ValidationError> {
        let dpr = draft.dpr.unwrap_or(MIN_DPR);
        let width = scale_dimension(draft.width, dpr, self.limits.max_width)?;
        let height = scale_dimension(draft.height, dpr, self.limits.max_height)?;

        // Fit modes only differ when both sides of the box are constrained
        let fit = if width.is_some() && height.is_some() {
            draft.fit.unwrap_or_default()
        } else {
            Fit::Contain
        };
        let gravity = if fit == Fit::Cover {
            draft.gravity.unwrap_or_default()
        } else {
            Gravity::Center
        };
        let quality = draft
            .quality
            .filter(|quality| *quality != self.limits.default_quality);

        Ok(Options {
            width,
            height,
            quality,
            format: draft.format,
            fit,
            gravity,
            rotate: draft.rotate.unwrap_or_default(),
        })
    }
}

fn canonical_key(key: &str) -> Option<&'static str> {
    let key = key.to_ascii_lowercase();
    RECOGNIZED_KEYS
        .iter()
        .find(|(_, aliases)| aliases.contains(&key.as_str()))
        .map(|(canonical, _)| *canonical)
}

fn parse_dimension(key: &'static str, value: &str, max: u32) -> Result<u32, ValidationError> {
    let parsed: u32 = value
        .parse()
        .map_err(|_| ValidationError::invalid(key, format!("expected an integer, got '{}'", value)))?;
    if parsed == 0 || parsed > max {
        return Err(ValidationError::invalid(
            key,
            format!("must be between 1 and {}", max),
        ));
    }
    Ok(parsed)
}

fn parse_quality(value: &str) -> Result<u8, ValidationError> {
    let parsed: u8 = value.parse().map_err(|_| {
        ValidationError::invalid("quality", format!("expected an integer, got '{}'", value))
    })?;
    if !(1..=100).contains(&parsed) {
        return Err(ValidationError::invalid("quality", "must be between 1 and 100"));
    }
    Ok(parsed)
}

fn parse_rotation(value: &str) -> Result<Rotation, ValidationError> {
    value
        .parse::<u16>()
        .ok()
        .and_then(Rotation::from_degrees)
        .ok_or_else(|| ValidationError::invalid("rotate", "must be one of 0, 90, 180, 270"))
}

fn parse_dpr(value: &str) -> Result<f32, ValidationError> {
    let parsed: f32 = value
        .trim()
        .parse()
        .map_err(|_| ValidationError::invalid("dpr", format!("expected a number, got '{}'", value)))?;
    if !parsed.is_finite() || !(MIN_DPR..=MAX_DPR).contains(&parsed) {
        return Err(ValidationError::invalid(
            "dpr",
            format!("must be between {} and {}", MIN_DPR, MAX_DPR),
        ));
    }
    Ok(parsed)
}

fn scale_dimension(value: Option<u32>, dpr: f32, max: u32) -> Result<Option<u32>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let scaled = (value as f32 * dpr).round();
    if scaled > max as f32 {
        return Err(ValidationError::invalid(
            "dpr",
            format!("scaled dimension {} exceeds the maximum of {}", scaled, max),
        ));
    }
    Ok(Some(scaled as u32))
}

fn header_value<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

fn dpr_hint(headers: &HeaderMap) -> Option<f32> {
    let value = header_value(headers, DPR_HINTS)?;
    match parse_dpr(value) {
        Ok(dpr) => Some(dpr),
        Err(e) => {
            debug!("Ignoring DPR client hint: {}", e);
            None
        }
    }
}

fn hint_u32(headers: &HeaderMap, names: &[&str], max: u32) -> Option<u32> {
    let value = header_value(headers, names)?;
    match value.parse::<u32>() {
        Ok(parsed) if parsed > 0 && parsed <= max => Some(parsed),
        _ => {
            debug!("Ignoring client hint {:?} = {:?}", names[0], value);
            None
        }
    }
}

/// Whether an Accept header lists `media_type` with a non-zero weight.
fn accepts_media_type(accept: &str, media_type: &str) -> bool {
    accept.split(',').any(|entry| {
        let mut params = entry.split(';');
        let name = params.next().unwrap_or_default().trim();
        if !name.eq_ignore_ascii_case(media_type) {
            return false;
        }
        params
            .filter_map(|param| param.trim().strip_prefix("q="))
            .all(|weight| weight.trim().parse::<f32>().map(|q| q > 0.0).unwrap_or(true))
    })
}
