use std::collections::HashMap;

use crate::application::options::MAX_SOURCE_SIZE_KBYTES;
use crate::application::repos::TransformCapabilities;
use crate::domain::definitions::RenditionOptions;

/// Static table of supported (source, target) media type pairs, optionally
/// narrowed to one rendition name.
#[derive(Debug, Clone, Default)]
pub struct TransformCapabilityTable {
    entries: HashMap<(String, String), i64>,
    named: HashMap<(String, String, String), i64>,
}

impl TransformCapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max_source_size` in bytes; `-1` is unlimited, `0` disables the pair.
    pub fn with_transform(
        mut self,
        source_media_type: impl Into<String>,
        target_media_type: impl Into<String>,
        max_source_size: i64,
    ) -> Self {
        self.entries.insert(
            (source_media_type.into(), target_media_type.into()),
            max_source_size,
        );
        self
    }

    /// Entry consulted only for `rendition_name`, ahead of the general one.
    pub fn with_named_transform(
        mut self,
        rendition_name: impl Into<String>,
        source_media_type: impl Into<String>,
        target_media_type: impl Into<String>,
        max_source_size: i64,
    ) -> Self {
        self.named.insert(
            (
                rendition_name.into(),
                source_media_type.into(),
                target_media_type.into(),
            ),
            max_source_size,
        );
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransformCapabilities for TransformCapabilityTable {
    fn find_max_size(
        &self,
        source_media_type: &str,
        target_media_type: &str,
        options: &RenditionOptions,
        rendition_name: Option<&str>,
    ) -> Option<i64> {
        let named = rendition_name.and_then(|name| {
            self.named
                .get(&(
                    name.to_string(),
                    source_media_type.to_string(),
                    target_media_type.to_string(),
                ))
                .copied()
        });
        let max = named.or_else(|| {
            self.entries
                .get(&(source_media_type.to_string(), target_media_type.to_string()))
                .copied()
        })?;
        Some(apply_requested_limit(max, options))
    }
}

/// A positive `maxSourceSizeKBytes` option can only lower the limit.
fn apply_requested_limit(max: i64, options: &RenditionOptions) -> i64 {
    let requested = options
        .get(MAX_SOURCE_SIZE_KBYTES)
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|kbytes| *kbytes > 0)
        .map(|kbytes| kbytes.saturating_mul(1024));
    match (max, requested) {
        (_, None) | (0, _) => max,
        (-1, Some(requested)) => requested,
        (max, Some(requested)) => max.min(requested),
    }
}
