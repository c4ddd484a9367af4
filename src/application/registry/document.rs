use thiserror::Error;

use rendition_api_types::{RenditionConfigDocument, RenditionEntry};

use crate::domain::definitions::{RenditionDefinition, RenditionOptions};

#[derive(Debug, Error)]
pub enum ConfigDocumentError {
    #[error("malformed rendition config document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("entry {index}: {message}")]
    InvalidEntry { index: usize, message: String },
}

impl ConfigDocumentError {
    fn entry(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            index,
            message: message.into(),
        }
    }
}

/// Definitions read from one document, plus the entries that were rejected.
#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub definitions: Vec<RenditionDefinition>,
    pub rejected: Vec<ConfigDocumentError>,
}

/// Parses a JSON rendition document. Only a document that is not JSON, or
/// whose top level has the wrong shape, fails as a whole.
pub fn parse_document(text: &str) -> Result<ParsedDocument, ConfigDocumentError> {
    let document: RenditionConfigDocument = serde_json::from_str(text)?;
    let mut parsed = ParsedDocument::default();
    for (index, raw) in document.renditions.into_iter().enumerate() {
        match parse_entry(index, raw) {
            Ok(definition) => parsed.definitions.push(definition),
            Err(err) => parsed.rejected.push(err),
        }
    }
    Ok(parsed)
}

fn parse_entry(
    index: usize,
    raw: serde_json::Value,
) -> Result<RenditionDefinition, ConfigDocumentError> {
    let entry: RenditionEntry = serde_json::from_value(raw)
        .map_err(|err| ConfigDocumentError::entry(index, err.to_string()))?;

    let mut options = RenditionOptions::new();
    for option in &entry.options {
        let value = option.scalar_value().ok_or_else(|| {
            ConfigDocumentError::entry(
                index,
                format!(
                    "option `{}` of `{}` is not a scalar",
                    option.name, entry.rendition_name
                ),
            )
        })?;
        if options.insert(option.name.clone(), value).is_some() {
            return Err(ConfigDocumentError::entry(
                index,
                format!(
                    "option `{}` of `{}` is repeated",
                    option.name, entry.rendition_name
                ),
            ));
        }
    }

    RenditionDefinition::try_dynamic(entry.rendition_name, entry.target_media_type, options)
        .map_err(|err| ConfigDocumentError::entry(index, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_entries_survive_invalid_neighbours() {
        let parsed = parse_document(
            r#"{
                "renditions": [
                    {"renditionName": "doclib", "targetMediaType": "image/png",
                     "options": [{"name": "resizeWidth", "value": 100},
                                 {"name": "allowEnlargement", "value": false}]},
                    {"renditionName": "broken"},
                    {"renditionName": "", "targetMediaType": "image/png"},
                    {"renditionName": "pdf", "targetMediaType": "application/pdf"}
                ]
            }"#,
        )
        .expect("document parses");

        let names: Vec<_> = parsed.definitions.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["doclib", "pdf"]);
        assert_eq!(parsed.rejected.len(), 2);

        let doclib = &parsed.definitions[0];
        assert!(doclib.is_dynamically_loaded());
        assert_eq!(doclib.options().get("resizeWidth").map(String::as_str), Some("100"));
        assert_eq!(
            doclib.options().get("allowEnlargement").map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn non_scalar_and_repeated_options_reject_the_entry() {
        let parsed = parse_document(
            r#"{"renditions": [
                {"renditionName": "a", "targetMediaType": "image/png",
                 "options": [{"name": "x", "value": [1, 2]}]},
                {"renditionName": "b", "targetMediaType": "image/png",
                 "options": [{"name": "x", "value": 1}, {"name": "x", "value": 2}]}
            ]}"#,
        )
        .expect("document parses");

        assert!(parsed.definitions.is_empty());
        assert!(parsed.rejected[0].to_string().contains("not a scalar"));
        assert!(parsed.rejected[1].to_string().contains("repeated"));
    }

    #[test]
    fn malformed_documents_fail_whole() {
        assert!(matches!(
            parse_document("{not json"),
            Err(ConfigDocumentError::Malformed(_))
        ));
        assert!(parse_document(r#"{"renditions": 5}"#).is_err());
    }

    #[test]
    fn missing_renditions_key_is_empty() {
        let parsed = parse_document("{}").expect("empty document");
        assert!(parsed.definitions.is_empty());
    }
}
