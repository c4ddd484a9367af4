//! Registry of named rendition definitions.
//!
//! Readers load an immutable snapshot without locking. Writers build a new
//! snapshot and swap it in, so a reload is seen by concurrent readers either
//! entirely or not at all.

mod document;
mod reload;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::application::repos::TransformCapabilities;
use crate::domain::definitions::RenditionDefinition;
use crate::util::lock::mutex_lock;

pub use document::{ConfigDocumentError, ParsedDocument, parse_document};
pub use reload::{
    ConfigDocument, ConfigSource, ConfigSourceError, METRIC_REGISTRY_RELOAD_TOTAL, RegistryReloader,
};

const SOURCE: &str = "application::registry";

/// Outcome of one reload pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub loaded: usize,
    pub skipped_entries: usize,
    pub failed_documents: usize,
    pub failed_sources: usize,
}

impl ReloadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_entries == 0 && self.failed_documents == 0 && self.failed_sources == 0
    }
}

/// One consistent view of the registry.
struct RegistrySnapshot {
    /// Definitions registered in code. Config entries of the same name shadow
    /// these without removing them.
    statics: HashMap<String, Arc<RenditionDefinition>>,
    definitions: HashMap<String, Arc<RenditionDefinition>>,
    /// Per source media type: rendition names with the largest source size each accepts.
    names_by_source: DashMap<String, Arc<Vec<(String, i64)>>>,
}

impl RegistrySnapshot {
    fn new(
        statics: HashMap<String, Arc<RenditionDefinition>>,
        definitions: HashMap<String, Arc<RenditionDefinition>>,
    ) -> Self {
        Self {
            statics,
            definitions,
            names_by_source: DashMap::new(),
        }
    }
}

pub struct RenditionDefinitionRegistry {
    snapshot: ArcSwap<RegistrySnapshot>,
    capabilities: Arc<dyn TransformCapabilities>,
    writer: Mutex<()>,
}

impl RenditionDefinitionRegistry {
    pub fn new(capabilities: Arc<dyn TransformCapabilities>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::new(
                HashMap::new(),
                HashMap::new(),
            )),
            capabilities,
            writer: Mutex::new(()),
        }
    }

    /// Adds or replaces a definition. Definitions that were not loaded from
    /// config are kept across reloads.
    pub fn register(&self, definition: RenditionDefinition) {
        let _writer = mutex_lock(&self.writer, SOURCE, "register");
        let current = self.snapshot.load_full();
        let mut statics = current.statics.clone();
        let mut definitions = current.definitions.clone();
        let name = definition.name().to_string();
        let definition = Arc::new(definition);
        if !definition.is_dynamically_loaded() {
            statics.insert(name.clone(), Arc::clone(&definition));
        }
        if definitions.insert(name.clone(), definition).is_some() {
            debug!(target = SOURCE, rendition = %name, "replaced rendition definition");
        }
        self.snapshot
            .store(Arc::new(RegistrySnapshot::new(statics, definitions)));
    }

    pub fn unregister(&self, name: &str) -> bool {
        let _writer = mutex_lock(&self.writer, SOURCE, "unregister");
        let current = self.snapshot.load_full();
        if !current.definitions.contains_key(name) {
            return false;
        }
        let mut statics = current.statics.clone();
        let mut definitions = current.definitions.clone();
        statics.remove(name);
        definitions.remove(name);
        self.snapshot
            .store(Arc::new(RegistrySnapshot::new(statics, definitions)));
        true
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.snapshot.load().definitions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<RenditionDefinition>> {
        self.snapshot.load().definitions.get(name).cloned()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.snapshot.load().definitions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn static_count(&self) -> usize {
        self.snapshot.load().statics.len()
    }

    /// Names of renditions that can be produced from a source of this media type and size.
    pub fn get_rendition_names_from(
        &self,
        source_media_type: &str,
        size: i64,
    ) -> BTreeSet<String> {
        let snapshot = self.snapshot.load_full();
        let cached = snapshot
            .names_by_source
            .get(source_media_type)
            .map(|entry| Arc::clone(entry.value()));
        let candidates = match cached {
            Some(cached) => cached,
            None => {
                let computed = Arc::new(self.max_sizes_for(&snapshot, source_media_type));
                snapshot
                    .names_by_source
                    .insert(source_media_type.to_string(), Arc::clone(&computed));
                computed
            }
        };
        candidates
            .iter()
            .filter(|(_, max_size)| *max_size == -1 || *max_size >= size)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn max_sizes_for(
        &self,
        snapshot: &RegistrySnapshot,
        source_media_type: &str,
    ) -> Vec<(String, i64)> {
        snapshot
            .definitions
            .values()
            .filter_map(|definition| {
                let max_size = self.capabilities.find_max_size(
                    source_media_type,
                    definition.target_media_type(),
                    definition.options(),
                    Some(definition.name()),
                )?;
                (max_size != 0).then(|| (definition.name().to_string(), max_size))
            })
            .collect()
    }

    /// Replaces every dynamically loaded definition with those read from
    /// `sources`. Static definitions survive, including ones a config entry
    /// shadowed on an earlier pass. Invalid entries and unreadable
    /// documents are skipped with a warning.
    pub fn reload(&self, sources: &[Arc<dyn ConfigSource>]) -> ReloadReport {
        let mut report = ReloadReport::default();
        let mut loaded: Vec<RenditionDefinition> = Vec::new();

        for source in sources {
            let documents = match source.read_documents() {
                Ok(documents) => documents,
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        source = source.name(),
                        error = %err,
                        "config source unreadable"
                    );
                    report.failed_sources += 1;
                    continue;
                }
            };
            for document in documents {
                match parse_document(&document.text) {
                    Ok(parsed) => {
                        for rejected in &parsed.rejected {
                            warn!(
                                target = SOURCE,
                                document = %document.name,
                                error = %rejected,
                                "skipping rendition definition"
                            );
                        }
                        report.skipped_entries += parsed.rejected.len();
                        loaded.extend(parsed.definitions);
                    }
                    Err(err) => {
                        warn!(
                            target = SOURCE,
                            document = %document.name,
                            error = %err,
                            "skipping config document"
                        );
                        report.failed_documents += 1;
                    }
                }
            }
        }

        let _writer = mutex_lock(&self.writer, SOURCE, "reload");
        let statics = self.snapshot.load().statics.clone();
        let mut definitions = statics.clone();
        for definition in loaded {
            let name = definition.name().to_string();
            if statics.contains_key(&name) {
                debug!(target = SOURCE, rendition = %name, "config shadows static definition");
            }
            definitions.insert(name, Arc::new(definition));
            report.loaded += 1;
        }
        let total = definitions.len();
        self.snapshot
            .store(Arc::new(RegistrySnapshot::new(statics, definitions)));

        info!(
            target = SOURCE,
            loaded = report.loaded,
            total,
            skipped = report.skipped_entries,
            "rendition definitions reloaded"
        );
        report
    }
}

#[cfg(test)]
mod tests;
