//! Wire types shared between the rendition engine and the processes around it.
//!
//! Two documents cross process boundaries:
//!
//! - [`RenditionConfigDocument`]: the JSON files that declare rendition
//!   definitions, read by the definition registry on every reload.
//! - [`TransformReplyEvent`]: the payload sent to a reply queue when an ad hoc
//!   transform completes or fails.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level rendition configuration document.
///
/// Entries are kept as raw JSON so that a single malformed entry can be
/// rejected without discarding the rest of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenditionConfigDocument {
    #[serde(default)]
    pub renditions: Vec<serde_json::Value>,
}

/// One rendition definition as written in a configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenditionEntry {
    pub rendition_name: String,
    pub target_media_type: String,
    #[serde(default)]
    pub options: Vec<RenditionOptionEntry>,
}

/// A single `{ "name": ..., "value": ... }` option pair.
///
/// Values may be strings, numbers or booleans in the document; the registry
/// stores every value in its string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenditionOptionEntry {
    pub name: String,
    pub value: serde_json::Value,
}

impl RenditionOptionEntry {
    /// Returns the option value as a string when it is a JSON scalar.
    pub fn scalar_value(&self) -> Option<String> {
        match &self.value {
            serde_json::Value::String(text) => Some(text.clone()),
            serde_json::Value::Number(number) => Some(number.to_string()),
            serde_json::Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }
}

/// Reply published for an ad hoc transform request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformReplyEvent {
    pub request_id: String,
    pub source_node: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_data: Option<String>,
    pub target_media_type: String,
    pub success: bool,
    /// Content locator of the transformed bytes. Present only on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Fingerprint of the source content the transform was requested against.
    pub source_fingerprint: i32,
}
