//! Conversion between flat option maps and structured transformation options.
//!
//! Rendition definitions carry a flat `name -> value` map. Legacy synchronous
//! engines take [`TransformationOptions`] instead. Converting flat to
//! structured and back yields an equivalent map: defaults are not written, and
//! unknown keys travel through [`TransformationOptions::extra`]. Maps whose
//! keys would shadow each other are rejected.

mod keys;

use std::collections::BTreeMap;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::definitions::RenditionOptions;

pub use keys::*;

const FLASH_MEDIA_TYPE: &str = "application/x-shockwave-flash";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnsupportedOptionsError {
    #[error("option `{key}` has unusable value `{value}`")]
    InvalidValue { key: String, value: String },
    #[error("source options of kind `{kind}` have no flat representation")]
    UnrecognizedSourceOptions { kind: String },
    #[error("option `{key}` cannot be combined with `{other}`")]
    Conflict { key: String, other: String },
}

impl UnsupportedOptionsError {
    fn invalid(key: &str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.into(),
        }
    }

    fn conflict(key: &str, other: &str) -> Self {
        Self::Conflict {
            key: key.to_string(),
            other: other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransformationOptions {
    pub timeout_ms: Option<i64>,
    pub max_source_size_kbytes: Option<i64>,
    pub page_limit: Option<i32>,
    pub include_embedded: Option<bool>,
    pub source_encoding: Option<String>,
    pub target_encoding: Option<String>,
    pub kind: OptionsKind,
    pub source_options: Vec<SourceOptions>,
    /// Flat keys with no structured counterpart.
    pub extra: RenditionOptions,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum OptionsKind {
    #[default]
    Generic,
    Image(ImageOptions),
    Flash {
        version: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOptions {
    pub resize: Option<ImageResizeOptions>,
    pub auto_orient: bool,
    pub alpha_remove: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            resize: None,
            auto_orient: true,
            alpha_remove: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageResizeOptions {
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// Width and height are percentages rather than pixels.
    pub percent_resize: bool,
    pub maintain_aspect_ratio: bool,
    pub allow_enlargement: bool,
    pub resize_to_thumbnail: bool,
}

impl Default for ImageResizeOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            percent_resize: false,
            maintain_aspect_ratio: true,
            allow_enlargement: true,
            resize_to_thumbnail: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceOptions {
    Paged(PagedSourceOptions),
    Crop(CropSourceOptions),
    Temporal(TemporalSourceOptions),
    /// Source options contributed by an engine this adapter does not know.
    Unrecognized { kind: String },
}

/// Page range, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PagedSourceOptions {
    pub start_page_number: Option<u32>,
    pub end_page_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CropSourceOptions {
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub x_offset: Option<i32>,
    pub y_offset: Option<i32>,
    pub percentage_crop: bool,
    pub gravity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemporalSourceOptions {
    pub offset: Option<String>,
    pub duration: Option<String>,
}

/// Builds structured options from a flat map.
pub fn to_structured(
    flat: &RenditionOptions,
    target_media_type: &str,
) -> Result<TransformationOptions, UnsupportedOptionsError> {
    let mut reader = FlatReader::new(flat);
    let mut options = TransformationOptions {
        timeout_ms: reader.parse(TIMEOUT)?,
        max_source_size_kbytes: reader.parse(MAX_SOURCE_SIZE_KBYTES)?,
        page_limit: reader.parse(PAGE_LIMIT)?,
        include_embedded: reader.flag(INCLUDE_CONTENTS)?,
        source_encoding: reader.text(SOURCE_ENCODING),
        target_encoding: reader.text(TARGET_ENCODING),
        ..TransformationOptions::default()
    };

    if let Some(paged) = read_pages(&mut reader)? {
        options.source_options.push(SourceOptions::Paged(paged));
    }
    if let Some(crop) = read_crop(&mut reader)? {
        options.source_options.push(SourceOptions::Crop(crop));
    }
    if let Some(temporal) = read_temporal(&mut reader) {
        options.source_options.push(SourceOptions::Temporal(temporal));
    }

    let flash_version = reader.text(FLASH_VERSION);
    let flash = target_media_type == FLASH_MEDIA_TYPE || flash_version.is_some();
    if flash && let Some(key) = IMAGE_KEYS.iter().find(|key| flat.contains_key(**key)) {
        let other = if flash_version.is_some() {
            FLASH_VERSION
        } else {
            FLASH_MEDIA_TYPE
        };
        return Err(UnsupportedOptionsError::conflict(key, other));
    }
    let image = read_image(&mut reader)?;
    options.kind = if flash {
        OptionsKind::Flash {
            version: flash_version,
        }
    } else if target_media_type.starts_with("image/") || image.is_some() {
        OptionsKind::Image(image.unwrap_or_default())
    } else {
        OptionsKind::Generic
    };

    options.extra = reader.into_remaining();
    Ok(options)
}

/// Flattens structured options. Defaults are omitted.
pub fn to_flat(
    options: &TransformationOptions,
) -> Result<RenditionOptions, UnsupportedOptionsError> {
    let mut flat = options.extra.clone();
    let mut put = |key: &str, value: String| {
        flat.insert(key.to_string(), value);
    };

    if let Some(timeout) = options.timeout_ms {
        put(TIMEOUT, timeout.to_string());
    }
    if let Some(max) = options.max_source_size_kbytes {
        put(MAX_SOURCE_SIZE_KBYTES, max.to_string());
    }
    if let Some(limit) = options.page_limit {
        put(PAGE_LIMIT, limit.to_string());
    }
    if let Some(include) = options.include_embedded {
        put(INCLUDE_CONTENTS, include.to_string());
    }
    if let Some(encoding) = &options.source_encoding {
        put(SOURCE_ENCODING, encoding.clone());
    }
    if let Some(encoding) = &options.target_encoding {
        put(TARGET_ENCODING, encoding.clone());
    }

    for source in &options.source_options {
        match source {
            SourceOptions::Paged(paged) => write_pages(paged, &mut put)?,
            SourceOptions::Crop(crop) => {
                if let Some(gravity) = &crop.gravity {
                    put(CROP_GRAVITY, gravity.clone());
                }
                if let Some(width) = crop.width {
                    put(CROP_WIDTH, width.to_string());
                }
                if let Some(height) = crop.height {
                    put(CROP_HEIGHT, height.to_string());
                }
                if let Some(x) = crop.x_offset {
                    put(CROP_X_OFFSET, x.to_string());
                }
                if let Some(y) = crop.y_offset {
                    put(CROP_Y_OFFSET, y.to_string());
                }
                if crop.percentage_crop {
                    put(CROP_PERCENTAGE, "true".to_string());
                }
            }
            SourceOptions::Temporal(temporal) => {
                if let Some(offset) = &temporal.offset {
                    put(OFFSET, offset.clone());
                }
                if let Some(duration) = &temporal.duration {
                    put(DURATION, duration.clone());
                }
            }
            SourceOptions::Unrecognized { kind } => {
                return Err(UnsupportedOptionsError::UnrecognizedSourceOptions {
                    kind: kind.clone(),
                });
            }
        }
    }

    match &options.kind {
        OptionsKind::Generic => {}
        OptionsKind::Flash { version } => {
            if let Some(version) = version {
                put(FLASH_VERSION, version.clone());
            }
        }
        OptionsKind::Image(image) => {
            if !image.auto_orient {
                put(AUTO_ORIENT, "false".to_string());
            }
            if image.alpha_remove {
                put(ALPHA_REMOVE, "true".to_string());
            }
            if let Some(resize) = &image.resize {
                if let Some(width) = resize.width {
                    put(RESIZE_WIDTH, width.to_string());
                }
                if let Some(height) = resize.height {
                    put(RESIZE_HEIGHT, height.to_string());
                }
                if resize.percent_resize {
                    put(RESIZE_PERCENTAGE, "true".to_string());
                }
                if !resize.maintain_aspect_ratio {
                    put(MAINTAIN_ASPECT_RATIO, "false".to_string());
                }
                if !resize.allow_enlargement {
                    put(ALLOW_ENLARGEMENT, "false".to_string());
                }
                if resize.resize_to_thumbnail {
                    put(THUMBNAIL, "true".to_string());
                }
            }
        }
    }

    Ok(flat)
}

fn read_pages(
    reader: &mut FlatReader<'_>,
) -> Result<Option<PagedSourceOptions>, UnsupportedOptionsError> {
    let page: Option<u32> = reader.parse(PAGE)?;
    let start: Option<u32> = reader.parse(START_PAGE)?;
    let end: Option<u32> = reader.parse(END_PAGE)?;
    let one_based = |key: &str, page: u32| {
        page.checked_add(1)
            .ok_or_else(|| UnsupportedOptionsError::invalid(key, page.to_string()))
    };

    let paged = match (page, start, end) {
        (None, None, None) => return Ok(None),
        (Some(_), Some(_), _) => return Err(UnsupportedOptionsError::conflict(PAGE, START_PAGE)),
        (Some(_), _, Some(_)) => return Err(UnsupportedOptionsError::conflict(PAGE, END_PAGE)),
        (Some(page), None, None) => {
            let number = one_based(PAGE, page)?;
            PagedSourceOptions {
                start_page_number: Some(number),
                end_page_number: Some(number),
            }
        }
        (None, start, end) => PagedSourceOptions {
            start_page_number: start.map(|p| one_based(START_PAGE, p)).transpose()?,
            end_page_number: end.map(|p| one_based(END_PAGE, p)).transpose()?,
        },
    };
    Ok(Some(paged))
}

fn write_pages(
    paged: &PagedSourceOptions,
    put: &mut impl FnMut(&str, String),
) -> Result<(), UnsupportedOptionsError> {
    let zero_based = |key: &str, page: u32| {
        page.checked_sub(1)
            .ok_or_else(|| UnsupportedOptionsError::invalid(key, page.to_string()))
    };
    match (paged.start_page_number, paged.end_page_number) {
        (Some(start), Some(end)) if start == end => {
            put(PAGE, zero_based(PAGE, start)?.to_string())
        }
        (start, end) => {
            if let Some(start) = start {
                put(START_PAGE, zero_based(START_PAGE, start)?.to_string());
            }
            if let Some(end) = end {
                put(END_PAGE, zero_based(END_PAGE, end)?.to_string());
            }
        }
    }
    Ok(())
}

fn read_crop(
    reader: &mut FlatReader<'_>,
) -> Result<Option<CropSourceOptions>, UnsupportedOptionsError> {
    let crop = CropSourceOptions {
        gravity: reader.text(CROP_GRAVITY),
        width: reader.parse(CROP_WIDTH)?,
        height: reader.parse(CROP_HEIGHT)?,
        x_offset: reader.parse(CROP_X_OFFSET)?,
        y_offset: reader.parse(CROP_Y_OFFSET)?,
        percentage_crop: reader.flag(CROP_PERCENTAGE)?.unwrap_or(false),
    };
    if crop == CropSourceOptions::default() {
        Ok(None)
    } else {
        Ok(Some(crop))
    }
}

fn read_temporal(reader: &mut FlatReader<'_>) -> Option<TemporalSourceOptions> {
    let temporal = TemporalSourceOptions {
        offset: reader.text(OFFSET),
        duration: reader.text(DURATION),
    };
    (temporal != TemporalSourceOptions::default()).then_some(temporal)
}

fn read_image(
    reader: &mut FlatReader<'_>,
) -> Result<Option<ImageOptions>, UnsupportedOptionsError> {
    let auto_orient = reader.flag(AUTO_ORIENT)?;
    let alpha_remove = reader.flag(ALPHA_REMOVE)?;
    let resize = ImageResizeOptions {
        width: reader.parse(RESIZE_WIDTH)?,
        height: reader.parse(RESIZE_HEIGHT)?,
        percent_resize: reader.flag(RESIZE_PERCENTAGE)?.unwrap_or(false),
        maintain_aspect_ratio: reader.flag(MAINTAIN_ASPECT_RATIO)?.unwrap_or(true),
        allow_enlargement: reader.flag(ALLOW_ENLARGEMENT)?.unwrap_or(true),
        resize_to_thumbnail: reader.flag(THUMBNAIL)?.unwrap_or(false),
    };

    let resize = (resize != ImageResizeOptions::default()).then_some(resize);
    if auto_orient.is_none() && alpha_remove.is_none() && resize.is_none() {
        return Ok(None);
    }
    Ok(Some(ImageOptions {
        resize,
        auto_orient: auto_orient.unwrap_or(true),
        alpha_remove: alpha_remove.unwrap_or(false),
    }))
}

/// Consumes keys from a flat map; whatever is left over becomes `extra`.
struct FlatReader<'a> {
    remaining: BTreeMap<&'a str, &'a str>,
}

impl<'a> FlatReader<'a> {
    fn new(flat: &'a RenditionOptions) -> Self {
        Self {
            remaining: flat
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect(),
        }
    }

    fn text(&mut self, key: &str) -> Option<String> {
        self.remaining.remove(key).map(str::to_string)
    }

    fn parse<T: FromStr>(&mut self, key: &str) -> Result<Option<T>, UnsupportedOptionsError> {
        match self.remaining.remove(key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| UnsupportedOptionsError::invalid(key, value)),
        }
    }

    fn flag(&mut self, key: &str) -> Result<Option<bool>, UnsupportedOptionsError> {
        match self.remaining.remove(key) {
            None => Ok(None),
            Some(value) if value.trim().eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(value) if value.trim().eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(value) => Err(UnsupportedOptionsError::invalid(key, value)),
        }
    }

    fn into_remaining(self) -> RenditionOptions {
        self.remaining
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests;
