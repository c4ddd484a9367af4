use std::collections::HashMap;

use super::*;
use crate::domain::definitions::RenditionOptions;

/// Max sizes keyed by target media type; anything else is unsupported.
struct Table(HashMap<&'static str, i64>);

impl TransformCapabilities for Table {
    fn find_max_size(
        &self,
        _source: &str,
        target: &str,
        _options: &RenditionOptions,
        _name: Option<&str>,
    ) -> Option<i64> {
        self.0.get(target).copied()
    }
}

struct Fixed(Vec<ConfigDocument>);

impl ConfigSource for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    fn read_documents(&self) -> Result<Vec<ConfigDocument>, ConfigSourceError> {
        Ok(self.0.clone())
    }
}

struct Broken;

impl ConfigSource for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn read_documents(&self) -> Result<Vec<ConfigDocument>, ConfigSourceError> {
        Err(ConfigSourceError::new("broken", "permission denied"))
    }
}

fn registry() -> RenditionDefinitionRegistry {
    RenditionDefinitionRegistry::new(Arc::new(Table(HashMap::from([
        ("image/png", -1),
        ("application/pdf", 1_000),
        ("image/webp", 0),
    ]))))
}

fn document(text: &str) -> Arc<dyn ConfigSource> {
    Arc::new(Fixed(vec![ConfigDocument {
        name: "renditions.json".to_string(),
        text: text.to_string(),
    }]))
}

#[test]
fn register_and_lookup() {
    let registry = registry();
    registry.register(RenditionDefinition::new(
        "doclib",
        "image/png",
        RenditionOptions::new(),
    ));

    assert!(registry.is_registered("doclib"));
    assert_eq!(
        registry.get("doclib").map(|d| d.target_media_type().to_string()),
        Some("image/png".to_string())
    );
    assert!(registry.get("missing").is_none());
    assert_eq!(registry.static_count(), 1);
}

#[test]
fn reload_keeps_static_definitions_and_replaces_dynamic_ones() {
    let registry = registry();
    registry.register(RenditionDefinition::new(
        "static",
        "image/png",
        RenditionOptions::new(),
    ));

    registry.reload(&[document(
        r#"{"renditions": [{"renditionName": "first", "targetMediaType": "image/png"}]}"#,
    )]);
    assert_eq!(registry.names(), BTreeSet::from(["first".into(), "static".into()]));

    let report = registry.reload(&[document(
        r#"{"renditions": [{"renditionName": "second", "targetMediaType": "image/png"}]}"#,
    )]);
    assert!(report.is_clean());
    assert_eq!(report.loaded, 1);
    assert_eq!(registry.names(), BTreeSet::from(["second".into(), "static".into()]));
}

#[test]
fn static_definitions_outlive_config_entries_of_the_same_name() {
    let registry = registry();
    registry.register(RenditionDefinition::new(
        "doclib",
        "image/png",
        RenditionOptions::new(),
    ));

    registry.reload(&[document(
        r#"{"renditions": [{"renditionName": "doclib", "targetMediaType": "application/pdf"}]}"#,
    )]);
    assert_eq!(
        registry.get("doclib").map(|d| d.target_media_type().to_string()),
        Some("application/pdf".to_string())
    );

    registry.reload(&[document(
        r#"{"renditions": [{"renditionName": "other", "targetMediaType": "image/png"}]}"#,
    )]);
    let doclib = registry.get("doclib").expect("static definition survives");
    assert_eq!(doclib.target_media_type(), "image/png");
    assert!(!doclib.is_dynamically_loaded());
    assert_eq!(registry.static_count(), 1);
}

#[test]
fn reload_skips_bad_documents_and_sources() {
    let registry = registry();
    let sources = vec![
        Arc::new(Broken) as Arc<dyn ConfigSource>,
        document("not json"),
        document(
            r#"{"renditions": [
                {"renditionName": "good", "targetMediaType": "image/png"},
                {"renditionName": "bad"}
            ]}"#,
        ),
    ];

    let report = registry.reload(&sources);

    assert_eq!(
        report,
        ReloadReport {
            loaded: 1,
            skipped_entries: 1,
            failed_documents: 1,
            failed_sources: 1,
        }
    );
    assert!(registry.is_registered("good"));
}

#[test]
fn names_from_source_respect_max_size() {
    let registry = registry();
    for (name, target) in [
        ("thumbnail", "image/png"),
        ("pdf", "application/pdf"),
        ("webp", "image/webp"),
        ("exotic", "model/stl"),
    ] {
        registry.register(RenditionDefinition::new(name, target, RenditionOptions::new()));
    }

    assert_eq!(
        registry.get_rendition_names_from("text/plain", 500),
        BTreeSet::from(["pdf".into(), "thumbnail".into()])
    );
    assert_eq!(
        registry.get_rendition_names_from("text/plain", 5_000),
        BTreeSet::from(["thumbnail".into()])
    );
}

#[test]
fn memo_is_rebuilt_after_registration() {
    let registry = registry();
    registry.register(RenditionDefinition::new(
        "thumbnail",
        "image/png",
        RenditionOptions::new(),
    ));
    assert_eq!(registry.get_rendition_names_from("text/plain", 1).len(), 1);

    registry.register(RenditionDefinition::new(
        "pdf",
        "application/pdf",
        RenditionOptions::new(),
    ));
    assert_eq!(registry.get_rendition_names_from("text/plain", 1).len(), 2);

    assert!(registry.unregister("pdf"));
    assert!(!registry.unregister("pdf"));
    assert_eq!(registry.get_rendition_names_from("text/plain", 1).len(), 1);
}
