//! Wiring of a rendition service over the in-memory stores.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use crate::application::dispatch::{LocalTransformClient, Transformer};
use crate::application::registry::RenditionDefinitionRegistry;
use crate::application::rendition::{
    RenditionCollaborators, RenditionPreventionRegistry, RenditionService, RenditionSettings,
};
use crate::application::repos::{NodeStore, TransformCapabilities};
use crate::application::tx::TransactionRunner;
use crate::config::Settings;

use super::memory::{
    MemoryContentStore, MemoryNodeStore, RecordingBehaviourFilter, RecordingMetadataSink,
    RecordingReplyChannel,
};

const SOURCE: &str = "infra::engine";

/// A rendition service and the in-memory collaborators it runs against.
pub struct MemoryEngine {
    pub runner: TransactionRunner,
    pub content: Arc<MemoryContentStore>,
    pub registry: Arc<RenditionDefinitionRegistry>,
    pub local: Arc<LocalTransformClient>,
    pub replies: Arc<RecordingReplyChannel>,
    pub metadata: Arc<RecordingMetadataSink>,
    pub service: RenditionService,
}

impl MemoryEngine {
    /// Builds the engine with the retry, concurrency and feature settings
    /// taken from `settings`.
    pub fn build(
        settings: &Settings,
        capabilities: Arc<dyn TransformCapabilities>,
        transformer: Arc<dyn Transformer>,
        runtime: Handle,
    ) -> Self {
        let runner = TransactionRunner::new(Arc::new(MemoryNodeStore::new()) as Arc<dyn NodeStore>)
            .with_max_retries(settings.transactions.max_retries);
        let content = Arc::new(MemoryContentStore::new());
        let max_concurrent_transforms =
            usize::try_from(settings.dispatch.max_concurrent_transforms.get())
                .unwrap_or(usize::MAX);
        let local = Arc::new(LocalTransformClient::new(
            runner.clone(),
            content.clone(),
            Arc::clone(&capabilities),
            transformer,
            runtime,
            max_concurrent_transforms,
        ));
        let registry = Arc::new(RenditionDefinitionRegistry::new(capabilities));
        let replies = Arc::new(RecordingReplyChannel::new());
        let metadata = Arc::new(RecordingMetadataSink::new());

        let service = RenditionService::new(
            RenditionSettings::from(&settings.renditions),
            RenditionCollaborators {
                runner: runner.clone(),
                registry: Arc::clone(&registry),
                client: local.clone(),
                content: content.clone(),
                behaviours: Arc::new(RecordingBehaviourFilter::new()),
                prevention: Arc::new(RenditionPreventionRegistry::new()),
                replies: replies.clone(),
                metadata: metadata.clone(),
            },
        );

        info!(
            target = SOURCE,
            enabled = service.is_enabled(),
            max_retries = runner.max_retries(),
            max_concurrent_transforms,
            "rendition engine ready"
        );

        Self {
            runner,
            content,
            registry,
            local,
            replies,
            metadata,
            service,
        }
    }
}
