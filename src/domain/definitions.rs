//! Rendition and transform definitions.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::util::lock::mutex_lock;

use super::error::DomainError;

const SOURCE: &str = "domain::definitions";

/// Prefix of the rendition name under which ad hoc transforms are scheduled.
pub const TRANSFORM_NAME_PREFIX: &str = "transform:";

/// Pseudo media types whose transform results are routed to the metadata sink.
pub mod metadata_media_types {
    pub const EXTRACT: &str = "alfresco-metadata-extract";
    pub const EMBED: &str = "alfresco-metadata-embed";
}

/// Flat option map passed to transform engines.
pub type RenditionOptions = BTreeMap<String, String>;

/// A named, registered rendition: target media type plus transform options.
///
/// Identity is the name: two definitions with the same name are equal.
#[derive(Debug, Clone)]
pub struct RenditionDefinition {
    name: String,
    target_media_type: String,
    options: RenditionOptions,
    dynamically_loaded: bool,
}

impl RenditionDefinition {
    /// A statically configured definition, kept across registry reloads.
    pub fn new(
        name: impl Into<String>,
        target_media_type: impl Into<String>,
        options: RenditionOptions,
    ) -> Self {
        Self {
            name: name.into(),
            target_media_type: target_media_type.into(),
            options,
            dynamically_loaded: false,
        }
    }

    /// A definition read from a configuration source; must be re-supplied on every reload.
    pub fn dynamic(
        name: impl Into<String>,
        target_media_type: impl Into<String>,
        options: RenditionOptions,
    ) -> Self {
        Self {
            dynamically_loaded: true,
            ..Self::new(name, target_media_type, options)
        }
    }

    /// Builds a dynamic definition, rejecting blank names and media types.
    pub fn try_dynamic(
        name: impl Into<String>,
        target_media_type: impl Into<String>,
        options: RenditionOptions,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let target_media_type = target_media_type.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("rendition name must not be blank"));
        }
        if target_media_type.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "rendition `{name}` has no target media type"
            )));
        }
        Ok(Self::dynamic(name, target_media_type, options))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_media_type(&self) -> &str {
        &self.target_media_type
    }

    pub fn options(&self) -> &RenditionOptions {
        &self.options
    }

    pub fn is_dynamically_loaded(&self) -> bool {
        self.dynamically_loaded
    }
}

impl PartialEq for RenditionDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RenditionDefinition {}

impl Hash for RenditionDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A transient, per-request transform whose result goes to a reply queue
/// rather than to a rendition node. Never registered.
#[derive(Debug)]
pub struct TransformDefinition {
    transform_name: Option<String>,
    target_media_type: String,
    options: RenditionOptions,
    client_data: Option<String>,
    reply_queue: Option<String>,
    request_id: String,
    error_message: Mutex<Option<String>>,
}

impl TransformDefinition {
    pub fn new(target_media_type: impl Into<String>, options: RenditionOptions) -> Self {
        Self {
            transform_name: None,
            target_media_type: target_media_type.into(),
            options,
            client_data: None,
            reply_queue: None,
            request_id: Uuid::new_v4().to_string(),
            error_message: Mutex::new(None),
        }
    }

    pub fn with_transform_name(mut self, name: impl Into<String>) -> Self {
        self.transform_name = Some(name.into());
        self
    }

    pub fn with_client_data(mut self, client_data: impl Into<String>) -> Self {
        self.client_data = Some(client_data.into());
        self
    }

    pub fn with_reply_queue(mut self, reply_queue: impl Into<String>) -> Self {
        self.reply_queue = Some(reply_queue.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Name used for scheduling: the transform name when given, the request id otherwise.
    pub fn rendition_name(&self) -> String {
        match &self.transform_name {
            Some(name) => format!("{TRANSFORM_NAME_PREFIX}{name}"),
            None => format!("{TRANSFORM_NAME_PREFIX}{}", self.request_id),
        }
    }

    pub fn transform_name(&self) -> Option<&str> {
        self.transform_name.as_deref()
    }

    pub fn target_media_type(&self) -> &str {
        &self.target_media_type
    }

    pub fn options(&self) -> &RenditionOptions {
        &self.options
    }

    pub fn client_data(&self) -> Option<&str> {
        self.client_data.as_deref()
    }

    pub fn reply_queue(&self) -> Option<&str> {
        self.reply_queue.as_deref()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn error_message(&self) -> Option<String> {
        mutex_lock(&self.error_message, SOURCE, "error_message").clone()
    }

    pub fn set_error_message(&self, message: impl Into<String>) {
        *mutex_lock(&self.error_message, SOURCE, "set_error_message") = Some(message.into());
    }
}

/// What a request asks for: a registered rendition or an ad hoc transform.
#[derive(Debug, Clone)]
pub enum RequestDefinition {
    Rendition(Arc<RenditionDefinition>),
    Transform(Arc<TransformDefinition>),
}

impl RequestDefinition {
    pub fn rendition_name(&self) -> String {
        match self {
            RequestDefinition::Rendition(definition) => definition.name().to_string(),
            RequestDefinition::Transform(definition) => definition.rendition_name(),
        }
    }

    pub fn target_media_type(&self) -> &str {
        match self {
            RequestDefinition::Rendition(definition) => definition.target_media_type(),
            RequestDefinition::Transform(definition) => definition.target_media_type(),
        }
    }

    pub fn options(&self) -> &RenditionOptions {
        match self {
            RequestDefinition::Rendition(definition) => definition.options(),
            RequestDefinition::Transform(definition) => definition.options(),
        }
    }

    /// Human readable label for logs.
    pub fn label(&self) -> String {
        match self {
            RequestDefinition::Rendition(definition) => format!("Rendition {}", definition.name()),
            RequestDefinition::Transform(definition) => match definition.transform_name() {
                Some(name) => format!("Transform {name}"),
                None => "Transform".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendition_equality_is_by_name() {
        let mut options = RenditionOptions::new();
        options.insert("resizeWidth".to_string(), "100".to_string());
        let first = RenditionDefinition::new("doclib", "image/png", options);
        let second = RenditionDefinition::dynamic("doclib", "image/jpeg", RenditionOptions::new());

        assert_eq!(first, second);
        assert!(!first.is_dynamically_loaded());
        assert!(second.is_dynamically_loaded());
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = RenditionDefinition::try_dynamic("  ", "image/png", RenditionOptions::new())
            .expect_err("blank name");
        assert!(matches!(err, DomainError::Validation { .. }));

        let err = RenditionDefinition::try_dynamic("doclib", "", RenditionOptions::new())
            .expect_err("blank media type");
        assert!(err.to_string().contains("doclib"));
    }

    #[test]
    fn anonymous_transforms_do_not_share_a_name() {
        let first = TransformDefinition::new("text/plain", RenditionOptions::new());
        let second = TransformDefinition::new("text/plain", RenditionOptions::new());
        assert_ne!(first.rendition_name(), second.rendition_name());

        let named = TransformDefinition::new("text/plain", RenditionOptions::new())
            .with_transform_name("extract");
        assert_eq!(named.rendition_name(), "transform:extract");
    }

    #[test]
    fn error_message_is_mutable_through_shared_reference() {
        let definition = Arc::new(TransformDefinition::new(
            "application/pdf",
            RenditionOptions::new(),
        ));
        assert_eq!(definition.error_message(), None);

        let shared = Arc::clone(&definition);
        shared.set_error_message("engine exploded");
        assert_eq!(definition.error_message().as_deref(), Some("engine exploded"));
    }

    #[test]
    fn request_labels() {
        let rendition = RequestDefinition::Rendition(Arc::new(RenditionDefinition::new(
            "pdf",
            "application/pdf",
            RenditionOptions::new(),
        )));
        assert_eq!(rendition.label(), "Rendition pdf");
        assert_eq!(rendition.rendition_name(), "pdf");

        let transform = RequestDefinition::Transform(Arc::new(
            TransformDefinition::new("text/plain", RenditionOptions::new())
                .with_transform_name("ocr"),
        ));
        assert_eq!(transform.label(), "Transform ocr");
    }
}
