//! Content descriptors and property values.

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Describes the binary content attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentData {
    /// Locator of the bytes in the content store.
    pub locator: String,
    pub media_type: String,
    pub size: i64,
    pub encoding: String,
}

impl ContentData {
    pub fn new(locator: impl Into<String>, media_type: impl Into<String>, size: i64) -> Self {
        Self {
            locator: locator.into(),
            media_type: media_type.into(),
            size,
            encoding: DEFAULT_ENCODING.to_string(),
        }
    }

    /// Content without a locator is treated as absent.
    pub fn has_locator(&self) -> bool {
        !self.locator.is_empty()
    }
}

/// Value stored in a node property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Text(String),
    Int(i32),
    Long(i64),
    Bool(bool),
    TextList(Vec<String>),
    Content(ContentData),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            PropertyValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::TextList(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    pub fn as_content(&self) -> Option<&ContentData> {
        match self {
            PropertyValue::Content(content) => Some(content),
            _ => None,
        }
    }
}

impl From<ContentData> for PropertyValue {
    fn from(content: ContentData) -> Self {
        PropertyValue::Content(content)
    }
}

impl From<&str> for PropertyValue {
    fn from(text: &str) -> Self {
        PropertyValue::Text(text.to_string())
    }
}

impl From<bool> for PropertyValue {
    fn from(flag: bool) -> Self {
        PropertyValue::Bool(flag)
    }
}
